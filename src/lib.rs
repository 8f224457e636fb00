mod actor;
mod replica;

pub use actor::create as create_quorum_actor;
pub use actor::ActorClient;
pub use actor::QuorumActor;
pub use actor::VoteTransport;
pub use actor::WeakActorClient;
pub use replica::mocked_clock;
pub use replica::CandidateState;
pub use replica::Clock;
pub use replica::DirectoryId;
pub use replica::DriverError;
pub use replica::ElectionRecord;
pub use replica::ElectionStore;
pub use replica::ElectionTimer;
pub use replica::Endpoints;
pub use replica::Epoch;
pub use replica::FileElectionStore;
pub use replica::FollowerState;
pub use replica::LeaderContact;
pub use replica::LeaderState;
pub use replica::ListenerName;
pub use replica::LogPosition;
pub use replica::MockClock;
pub use replica::MockClockController;
pub use replica::QuorumConfig;
pub use replica::QuorumOptions;
pub use replica::QuorumOptionsValidated;
pub use replica::QuorumRole;
pub use replica::QuorumRoleListener;
pub use replica::QuorumStateController;
pub use replica::RealClock;
pub use replica::ReplicaId;
pub use replica::ReplicaKey;
pub use replica::ResignedState;
pub use replica::RoleKind;
pub use replica::StoreError;
pub use replica::TimeoutRange;
pub use replica::TransitionError;
pub use replica::TransportError;
pub use replica::UnattachedState;
pub use replica::VolatileElectionStore;
pub use replica::VoteRequest;
pub use replica::VoteResponse;
pub use replica::VoteRound;
pub use replica::VoteSolicitation;
