//! Deterministic clocks.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use turnstile_core::Clock;

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use turnstile_testing::FixedClock;
/// use turnstile_core::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// assert_eq!(clock.now(), clock.now());
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// A clock tests can move forward.
///
/// Clones share the same instant, so a test can keep a handle while the
/// services hold another behind `Arc<dyn Clock>`.
#[derive(Debug, Clone)]
pub struct SteppingClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl SteppingClock {
    /// Start at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut time = self.time.lock().unwrap();
        *time += by;
    }

    /// Jump to `time`.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.time.lock().unwrap() = time;
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock().unwrap()
    }
}

/// Create a default clock for tests: 2025-06-01 18:00:00 UTC, two hours
/// before [`event_start`](crate::fixtures::event_start).
#[must_use]
pub fn test_clock() -> SteppingClock {
    SteppingClock::new(crate::fixtures::at("2025-06-01T18:00:00Z"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_clones_share_time() {
        let clock = test_clock();
        let handle = clock.clone();
        let before = clock.now();
        handle.advance(Duration::minutes(5));
        assert_eq!(clock.now(), before + Duration::minutes(5));
    }
}
