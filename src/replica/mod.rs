// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
mod election;
mod endpoints;
mod file_store;
mod local_state;
mod options;
mod peers;
mod quorum_state;
mod replica_api;

pub use election::mocked_clock;
pub use election::CandidateState;
pub use election::Clock;
pub use election::ElectionTimer;
pub use election::FollowerState;
pub use election::LeaderState;
pub use election::MockClock;
pub use election::MockClockController;
pub use election::QuorumRole;
pub use election::QuorumRoleListener;
pub use election::RealClock;
pub use election::ResignedState;
pub use election::RoleKind;
pub use election::TimeoutRange;
pub use election::UnattachedState;
pub use election::VoteRound;
pub use endpoints::Endpoints;
pub use endpoints::ListenerName;
pub use file_store::FileElectionStore;
pub use local_state::ElectionRecord;
pub use local_state::ElectionStore;
pub use local_state::Epoch;
pub use local_state::StoreError;
pub use local_state::VolatileElectionStore;
pub use options::QuorumConfig;
pub use options::QuorumOptions;
pub use options::QuorumOptionsValidated;
pub use peers::DirectoryId;
pub use peers::ReplicaId;
pub use peers::ReplicaKey;
pub use quorum_state::QuorumStateController;
pub use replica_api::DriverError;
pub use replica_api::LeaderContact;
pub use replica_api::LogPosition;
pub use replica_api::TransitionError;
pub use replica_api::TransportError;
pub use replica_api::VoteRequest;
pub use replica_api::VoteResponse;
pub use replica_api::VoteSolicitation;
