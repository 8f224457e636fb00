use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// Clock is the only source of "now" for election timers and the only thing the quorum actor
/// sleeps on. Production uses `RealClock`; tests use `mocked_clock()` and move time by hand, so
/// timeouts fire exactly when a test says they do.
#[async_trait::async_trait]
pub trait Clock: Clone {
    fn now(&self) -> Instant;

    /// Returns once `now()` is at or past `deadline`.
    async fn sleep_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

/// Every `MockClock` clone reads the time owned by the returned controller.
pub fn mocked_clock() -> (MockClock, MockClockController) {
    let (tx, rx) = watch::channel(Instant::now());
    (MockClock { now: rx }, MockClockController { now: tx })
}

#[derive(Clone)]
pub struct MockClock {
    now: watch::Receiver<Instant>,
}

#[async_trait::async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.now.borrow()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        while *self.now.borrow() < deadline {
            if self.now.changed().await.is_err() {
                // Nobody can advance time anymore. Sleep forever, like an actor with no deadline.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub struct MockClockController {
    now: watch::Sender<Instant>,
}

impl MockClockController {
    pub fn current_time(&self) -> Instant {
        *self.now.borrow()
    }

    /// Sleepers wake on the first advance that reaches their deadline, however far past it that
    /// advance lands. Step in increments smaller than the timeouts you want to tell apart.
    pub fn advance(&mut self, duration: Duration) {
        let next = *self.now.borrow() + duration;
        // Unlike `send`, this still moves time when no MockClock is left to observe it.
        self.now.send_replace(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replica::election::timers::ElectionTimer;
    use tokio::sync::oneshot;

    #[test]
    fn now_follows_controller() {
        let (clock, mut controller) = mocked_clock();
        let start = clock.now();

        controller.advance(Duration::from_millis(10));
        assert_eq!(clock.now() - start, Duration::from_millis(10));
        assert_eq!(controller.current_time(), clock.now());
    }

    #[tokio::test]
    async fn sleeper_wakes_when_election_timer_expires() {
        let (mut clock, mut controller) = mocked_clock();
        let timer = ElectionTimer::new(clock.now(), Duration::from_millis(1000));
        let (tx, mut rx) = oneshot::channel();

        let sleeper = clock.clone();
        tokio::spawn(async move {
            clock.sleep_until(timer.deadline()).await;
            let _ = tx.send(timer.remaining_ms(sleeper.now()));
        });

        // Step well below the timeout so the wake-up lands on the deadline.
        for _ in 0..9 {
            controller.advance(Duration::from_millis(100));
            tokio::task::yield_now().await;
            assert!(rx.try_recv().is_err(), "Woke before the election timeout");
        }
        assert!(!timer.is_expired(controller.current_time()));

        controller.advance(Duration::from_millis(100));
        let remaining_at_wake = tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("Sleeper should wake at the deadline")
            .unwrap();
        assert_eq!(remaining_at_wake, 0);
        assert!(timer.is_expired(controller.current_time()));
    }

    #[tokio::test]
    async fn sleeper_parks_once_controller_is_gone() {
        let (mut clock, controller) = mocked_clock();
        let deadline = clock.now() + Duration::from_millis(1);
        drop(controller);

        tokio::time::timeout(Duration::from_millis(50), clock.sleep_until(deadline))
            .await
            .expect_err("Time can't reach the deadline without a controller");
    }
}
