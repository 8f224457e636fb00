mod election_timer;
mod time;

pub use election_timer::ElectionTimer;
pub use election_timer::TimeoutRange;
pub use time::mocked_clock;
pub use time::Clock;
pub use time::MockClock;
pub use time::MockClockController;
pub use time::RealClock;
