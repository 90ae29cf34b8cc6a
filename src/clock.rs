//! Lease time source and expiry predicate.
//!
//! Lock timestamps are floating point seconds since the Unix epoch so that
//! records written by other implementations of the protocol stay readable.

use crate::locks::LockRecord;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// A wall-clock time source.
pub trait Clock: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}

/// A clock that only moves when told to.
///
/// Several sessions can share one `ManualClock` behind an `Arc` to run on a
/// single simulated timeline.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock frozen at `start` seconds since the epoch.
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: f64) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = secs;
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Check whether a lease has lapsed.
///
/// Strict: a record exactly `ttl_secs` old is still live.
pub fn is_expired(record: &LockRecord, ttl_secs: u64, now: f64) -> bool {
    now - record.updated_at > ttl_secs as f64
}

/// Convert epoch seconds into a UTC timestamp, truncated to whole seconds.
///
/// Out-of-range values clamp to the epoch.
pub fn to_datetime(secs: f64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs.floor() as i64, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    fn record_updated_at(updated_at: f64) -> LockRecord {
        LockRecord::new(
            &Identity::new("einstein", "cernbox.cern.ch", "4c510ada"),
            updated_at,
            updated_at,
        )
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let record = record_updated_at(1_000.0);

        assert!(!is_expired(&record, 150, 1_000.0));
        assert!(!is_expired(&record, 150, 1_149.5));
        assert!(!is_expired(&record, 150, 1_150.0));
        assert!(is_expired(&record, 150, 1_150.001));
        assert!(is_expired(&record, 150, 1_200.0));
    }

    #[test]
    fn manual_clock_moves_only_on_request() {
        let clock = ManualClock::new(100.0);
        assert_eq!(clock.now(), 100.0);

        clock.advance(10.5);
        assert_eq!(clock.now(), 110.5);

        clock.set(5.0);
        assert_eq!(clock.now(), 5.0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800.0);
    }

    #[test]
    fn to_datetime_truncates_fraction() {
        let dt = to_datetime(1_704_164_645.9);
        assert_eq!(
            dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2024-01-02 03:04:05"
        );
    }
}
