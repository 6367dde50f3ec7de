//! Wall-clock source used for listen accounting.
//!
//! The core measures how long a track was heard by comparing two readings of
//! the injected [`Clock`]. Tests drive a [`ManualClock`] so those durations
//! are exact.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use crate::platform::PlatformSendSync;

/// Time source trait
///
/// # Example
///
/// ```
/// use bridge_traits::time::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::default();
/// let started = clock.now();
/// clock.advance(Duration::from_secs(12));
/// assert_eq!(clock.millis_since(started), 12_000);
/// ```
pub trait Clock: PlatformSendSync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds elapsed since `start`, saturating at zero when the clock
    /// moved backwards.
    fn millis_since(&self, start: DateTime<Utc>) -> u64 {
        (self.now() - start).num_milliseconds().max(0) as u64
    }
}

/// Clock backed by the operating system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests and replays.
///
/// Starts at the given instant and only moves when [`ManualClock::advance`] or
/// [`ManualClock::set`] is called.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as i64, Ordering::SeqCst);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis
            .store(instant.timestamp_millis(), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
        assert!(SystemClock.millis_since(before) < 60_000);
    }

    #[test]
    fn manual_clock_only_moves_when_told() {
        let clock = ManualClock::default();
        let start = clock.now();
        assert_eq!(clock.millis_since(start), 0);

        clock.advance(Duration::from_millis(1_500));
        assert_eq!(clock.millis_since(start), 1_500);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.millis_since(start), 3_500);
    }

    #[test]
    fn elapsed_saturates_when_clock_goes_back() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 11, 59, 0).unwrap());
        assert_eq!(clock.millis_since(start), 0);
    }
}
