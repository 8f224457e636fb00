mod election_state;
mod leader_state;
mod state_change_listener;
mod timers;
mod vote_policy;

pub use election_state::CandidateState;
pub use election_state::FollowerState;
pub use election_state::QuorumRole;
pub use election_state::ResignedState;
pub use election_state::RoleKind;
pub use election_state::UnattachedState;
pub use election_state::VoteRound;
pub use leader_state::LeaderState;
pub(crate) use state_change_listener::new_role_channel;
pub(crate) use state_change_listener::QuorumRoleNotifier;
pub use state_change_listener::QuorumRoleListener;
pub use timers::mocked_clock;
pub use timers::Clock;
pub use timers::ElectionTimer;
pub use timers::MockClock;
pub use timers::MockClockController;
pub use timers::RealClock;
pub use timers::TimeoutRange;
