//! Wall-clock sources for run identifiers and file names
//!
//! The engine stamps every cycle with a `run_id` and every sink with a
//! per-run file timestamp. Both come from a [`Clock`] so tests can pin time.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Timestamp layout used for `run_id` values and output file names.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time rendered with [`RUN_TIMESTAMP_FORMAT`].
    fn run_stamp(&self) -> String {
        self.now().format(RUN_TIMESTAMP_FORMAT).to_string()
    }
}

/// System clock that never goes backward.
///
/// If the wall clock steps back (e.g. NTP adjustment), the previous
/// high-water mark is returned instead, so cycle stamps stay ordered.
pub struct SystemClock {
    high_water_ms: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            high_water_ms: AtomicI64::new(0),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        let prev = self.high_water_ms.fetch_max(wall, Ordering::AcqRel);
        let ms = wall.max(prev);
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

/// Manually driven clock for tests.
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            secs: AtomicI64::new(start.timestamp()),
        }
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.secs.fetch_add(secs, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::Acquire);
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }
}
