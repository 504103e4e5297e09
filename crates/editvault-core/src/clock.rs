//! Millisecond clock helpers.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A clock that never goes backwards within one process.
///
/// Wall-clock adjustments can move `now` behind a value already handed out;
/// in that case the last issued value is repeated instead.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the clock so that the next tick is at least `millis`.
    pub fn starting_at(millis: i64) -> Self {
        Self {
            last: AtomicI64::new(millis),
        }
    }

    /// Issue the next timestamp.
    pub fn tick(&self) -> i64 {
        let now = now_millis();
        let prev = self.last.fetch_max(now, Ordering::SeqCst);
        prev.max(now)
    }

    /// The most recently issued timestamp.
    pub fn last(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_are_non_decreasing() {
        let clock = MonotonicClock::new();
        let mut prev = clock.tick();
        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_seeded_clock_ignores_earlier_wall_time() {
        let future = now_millis() + 60_000;
        let clock = MonotonicClock::starting_at(future);

        assert_eq!(clock.tick(), future);
        assert_eq!(clock.last(), future);
    }
}
