//! Time sources for the tracker

use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic time for hysteresis timers
    fn now(&self) -> Instant;

    /// Wall-clock time for the day cycle
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real time. `now()` follows tokio's clock, so paused test runtimes apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock whose wall time is set by hand
#[derive(Debug)]
pub struct ManualClock {
    utc: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(utc: DateTime<Utc>) -> Self {
        Self {
            utc: Mutex::new(utc),
        }
    }

    pub fn set_utc(&self, utc: DateTime<Utc>) {
        *self.utc.lock().unwrap_or_else(PoisonError::into_inner) = utc;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        *self.utc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
