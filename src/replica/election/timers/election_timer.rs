use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// ElectionTimer is pure arithmetic over `(start, timeout, now)`. It never fires anything on its
/// own; whoever owns the role asks it whether time is up.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ElectionTimer {
    start: Instant,
    timeout: Duration,
}

impl ElectionTimer {
    pub fn new(start: Instant, timeout: Duration) -> Self {
        ElectionTimer { start, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn deadline(&self) -> Instant {
        self.start + self.timeout
    }

    /// Clamped at zero. A `now` from before `start` counts as no time elapsed.
    pub fn remaining(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.start);
        self.timeout.saturating_sub(elapsed)
    }

    /// Rounded up, so this only reads 0 once the timer has actually expired.
    pub fn remaining_ms(&self, now: Instant) -> u64 {
        let remaining = self.remaining(now);
        let whole_ms = remaining.as_millis() as u64;
        if remaining > Duration::from_millis(whole_ms) {
            whole_ms + 1
        } else {
            whole_ms
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.remaining(now) == Duration::from_millis(0)
    }
}

/// TimeoutRange draws a fresh jittered timeout for every new election timer so competing
/// candidates stop colliding on the same schedule.
#[derive(Clone, Debug)]
pub struct TimeoutRange {
    range: RangeInclusive<Duration>,
}

impl TimeoutRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        TimeoutRange {
            range: RangeInclusive::new(min, max),
        }
    }

    pub fn min(&self) -> Duration {
        *self.range.start()
    }

    pub fn max(&self) -> Duration {
        *self.range.end()
    }

    pub fn random_timeout(&self) -> Duration {
        if self.min() >= self.max() {
            return self.min();
        }
        rand::thread_rng().gen_range(self.range.clone())
    }

    pub fn start_timer(&self, now: Instant) -> ElectionTimer {
        ElectionTimer::new(now, self.random_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_and_expiry() {
        let start = Instant::now();
        let timer = ElectionTimer::new(start, Duration::from_millis(10_000));

        assert_eq!(timer.remaining_ms(start), 10_000);
        assert!(!timer.is_expired(start));

        let half = start + Duration::from_millis(5000);
        assert_eq!(timer.remaining_ms(half), 5000);
        assert!(!timer.is_expired(half));

        let end = start + Duration::from_millis(10_000);
        assert_eq!(timer.remaining_ms(end), 0);
        assert!(timer.is_expired(end));
        assert_eq!(timer.deadline(), end);
    }

    #[test]
    fn remaining_never_goes_negative() {
        let start = Instant::now();
        let timer = ElectionTimer::new(start, Duration::from_millis(100));

        let long_after = start + Duration::from_secs(3600);
        assert_eq!(timer.remaining(long_after), Duration::from_millis(0));
        assert!(timer.is_expired(long_after));
    }

    #[test]
    fn remaining_is_non_increasing() {
        let start = Instant::now();
        let timer = ElectionTimer::new(start, Duration::from_millis(1000));

        let mut previous = timer.remaining_ms(start);
        for step in 1..30 {
            let now = start + Duration::from_millis(step * 50);
            let remaining = timer.remaining_ms(now);
            assert!(remaining <= previous);
            assert_eq!(timer.is_expired(now), remaining == 0);
            previous = remaining;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn sub_millisecond_remainder_is_not_expired() {
        let start = Instant::now();
        let timer = ElectionTimer::new(start, Duration::from_millis(1000));

        let almost = start + Duration::from_micros(999_500);
        assert_eq!(timer.remaining_ms(almost), 1);
        assert!(!timer.is_expired(almost));

        let end = start + Duration::from_millis(1000);
        assert_eq!(timer.remaining_ms(end), 0);
        assert!(timer.is_expired(end));
    }

    #[test]
    fn jittered_timeouts_stay_in_range() {
        let min = Duration::from_millis(150);
        let max = Duration::from_millis(300);
        let range = TimeoutRange::new(min, max);

        for _ in 0..200 {
            let timeout = range.random_timeout();
            assert!(timeout >= min && timeout <= max, "{:?} out of range", timeout);
        }
    }

    #[test]
    fn fixed_range() {
        let timeout = Duration::from_millis(200);
        let range = TimeoutRange::new(timeout, timeout);
        let now = Instant::now();

        assert_eq!(range.start_timer(now), ElectionTimer::new(now, timeout));
    }
}
