//! Injectable time source
//!
//! The quality windows prune by age, so the code that reads time must be
//! swappable: production reads the real clocks, tests advance a mock by hand
//! instead of sleeping through the window.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// Trait for reading the current time
pub trait Clock: Send + Sync + 'static {
    /// Monotonic reading, for window pruning and interval math
    fn now(&self) -> Instant;

    /// Wall-clock reading, for timestamps that get serialized
    fn system_time(&self) -> SystemTime;
}

/// Production clock reading the real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Hand-advanced clock for tests
///
/// Both readings move only through [`MockClock::advance`]. Clones share the
/// same elapsed counter, so a test can hold one handle while the code under
/// test holds another.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
}

impl MockClock {
    /// Create a mock clock frozen at the current instant
    pub fn new() -> Self {
        Self { start: Instant::now(), elapsed: Arc::new(Mutex::new(Duration::ZERO)) }
    }

    /// Move both readings forward by `duration`
    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + *self.elapsed.lock()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + *self.elapsed.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests the system clock never reads backwards.
    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();

        assert!(second >= first);
    }

    /// Tests advancing the mock moves both the monotonic and wall readings.
    #[test]
    fn test_mock_clock_advance_moves_both_readings() {
        let clock = MockClock::new();
        let instant_before = clock.now();
        let wall_before = clock.system_time();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(instant_before), Duration::from_secs(5));
        assert_eq!(
            clock.system_time().duration_since(wall_before).unwrap_or_default(),
            Duration::from_secs(5)
        );
    }

    /// Tests clones share one elapsed counter, whichever handle advances it.
    #[test]
    fn test_mock_clock_clones_share_elapsed() {
        let held_by_test = MockClock::new();
        let held_by_code = held_by_test.clone();
        let before = held_by_code.now();

        held_by_test.advance(Duration::from_secs(10));

        assert_eq!(held_by_code.now().duration_since(before), Duration::from_secs(10));
    }
}
