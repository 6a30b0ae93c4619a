//! Virtual clock.
//!
//! The engine never reads the system clock. Time starts at a fixed origin and
//! only moves when a caller advances it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{EngineError, Result};

/// Controlled time source shared by an engine and its processor.
///
/// Clones share the same offset. Advances are linearizable: once
/// [`advance`](VirtualClock::advance) returns, every [`now`](VirtualClock::now)
/// from any clone observes at least the new value.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    origin: DateTime<Utc>,
    offset_millis: Arc<AtomicI64>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            offset_millis: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Current virtual time.
    ///
    /// [`advance`](VirtualClock::advance) only stores offsets that stay
    /// representable, so the fallback to the origin is never taken.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        let offset = TimeDelta::milliseconds(self.offset_millis.load(Ordering::SeqCst));
        self.origin.checked_add_signed(offset).unwrap_or(self.origin)
    }

    /// Current virtual time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Total amount the clock has been advanced.
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.offset_millis.load(Ordering::SeqCst)).unwrap_or(0))
    }

    /// Move the clock forward by `by` and return the new time.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidArgument`] if the new time would not be
    /// representable.
    pub fn advance(&self, by: Duration) -> Result<DateTime<Utc>> {
        let millis = i64::try_from(by.as_millis())
            .map_err(|_| EngineError::invalid_argument(format!("cannot advance clock by {by:?}")))?;

        self.offset_millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |offset| {
                offset
                    .checked_add(millis)
                    .filter(|next| self.origin.checked_add_signed(TimeDelta::milliseconds(*next)).is_some())
            })
            .map_err(|offset| {
                EngineError::invalid_argument(format!(
                    "advancing clock by {millis} ms overflows offset {offset} ms"
                ))
            })?;

        Ok(self.now())
    }
}

impl Default for VirtualClock {
    /// A clock starting at the current wall-clock time.
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;
    use proptest::prelude::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(0).unwrap()
    }

    #[test]
    fn test_clock_starts_at_origin() {
        let clock = VirtualClock::new(epoch());
        assert_eq!(clock.now_millis(), 0);
        assert_eq!(clock.offset(), Duration::ZERO);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = VirtualClock::new(epoch());
        let other = clock.clone();

        clock.advance(Duration::from_millis(1_500)).unwrap();
        assert_eq!(other.now_millis(), 1_500);
    }

    #[test]
    fn test_advance_by_zero_keeps_time() {
        let clock = VirtualClock::new(epoch());
        let before = clock.now();
        assert_eq!(clock.advance(Duration::ZERO).unwrap(), before);
    }

    #[test]
    fn test_overflowing_advance_is_rejected() {
        let clock = VirtualClock::new(epoch());
        let result = clock.advance(Duration::from_secs(u64::MAX));
        assert!(matches!(result, Err(EngineError::InvalidArgument { .. })));
        assert_eq!(clock.now_millis(), 0);
    }

    #[test]
    fn test_advance_past_the_last_representable_instant_is_rejected() {
        let origin = DateTime::<Utc>::MAX_UTC - TimeDelta::milliseconds(10);
        let clock = VirtualClock::new(origin);

        clock.advance(Duration::from_millis(10)).unwrap();
        let result = clock.advance(Duration::from_millis(1));
        assert!(matches!(result, Err(EngineError::InvalidArgument { .. })));
        assert_eq!(clock.now(), origin + TimeDelta::milliseconds(10));
        assert_eq!(clock.offset(), Duration::from_millis(10));
    }

    proptest! {
        #[test]
        fn prop_advances_are_additive(a in 0u64..1_000_000_000, b in 0u64..1_000_000_000) {
            let split = VirtualClock::new(epoch());
            split.advance(Duration::from_millis(a)).unwrap();
            split.advance(Duration::from_millis(b)).unwrap();

            let once = VirtualClock::new(epoch());
            once.advance(Duration::from_millis(a + b)).unwrap();

            prop_assert_eq!(split.now(), once.now());
        }
    }
}
