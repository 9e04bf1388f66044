//! Time sources for stamping group modifications.

use crate::types::Timestamp;
use chrono::Utc;
use parking_lot::Mutex;
use std::time::Duration;

/// Supplies the current time to the store.
pub trait Clock: Sync + Send + 'static {
    fn now(&self) -> Timestamp;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at the UNIX epoch plus `millis`.
    pub fn from_millis(millis: i64) -> Self {
        let start = Timestamp::from_timestamp_millis(millis).unwrap_or_default();
        Self::new(start)
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `delta`. The clock saturates: an
    /// advance past the largest representable timestamp leaves it where
    /// it is.
    pub fn advance(&self, delta: Duration) {
        let delta = chrono::Duration::from_std(delta).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(delta).unwrap_or(*now);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
