//! Deterministic clocks.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use storefront_core::clock::Clock;

/// Fixed clock for deterministic tests.
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use storefront_testing::mocks::FixedClock;
/// use storefront_core::clock::Clock;
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
    /// Create a new fixed clock with the given time.
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

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC).
///
/// # Panics
///
/// Panics if the hardcoded timestamp fails to parse, which cannot happen.
#[must_use]
#[allow(clippy::expect_used)]
pub fn test_clock() -> FixedClock {
    FixedClock::new(
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc),
    )
}

/// A clock tests can move forward, for daily-limit windows, coupon validity
/// and order expiry.
#[derive(Debug, Clone)]
pub struct AdjustableClock {
    time: Arc<Mutex<DateTime<Utc>>>,
}

impl AdjustableClock {
    /// Create an adjustable clock starting at `time`.
    #[must_use]
    pub fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Arc::new(Mutex::new(time)),
        }
    }

    /// Starting at the [`test_clock`] instant.
    #[must_use]
    pub fn at_test_epoch() -> Self {
        Self::new(test_clock().now())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.time.lock() += by;
    }

    /// Set the clock.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.time.lock() = to;
    }
}

impl Clock for AdjustableClock {
    fn now(&self) -> DateTime<Utc> {
        *self.time.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_fixed() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn adjustable_clock_advances() {
        let clock = AdjustableClock::at_test_epoch();
        let start = clock.now();
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now() - start, Duration::hours(2));
    }
}
