//! Window arithmetic and time sources.

use chrono::Utc;
use parking_lot::Mutex;

/// Source of the current wall-clock time in fractional epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}

/// The window value for `now`.
///
/// With an interval this is the fractional index of the interval-sized
/// bucket `now` falls in, which puts every identifier on the same clock
/// grid. Without one it is `now` itself, for algorithms that anchor to a
/// previously stored observation.
pub fn current_window(now: f64, interval: Option<u64>) -> f64 {
    match interval {
        Some(interval) => now / interval as f64,
        None => now,
    }
}

/// Whether a stored window is stale and its counter must be reset.
///
/// Both values are truncated to whole numbers first. Without an interval a
/// window is new once the integer part advances; with one it is new once
/// more than `interval` whole units have passed.
pub fn is_new_window(last_window: f64, current_window: f64, interval: Option<u64>) -> bool {
    let last = last_window.trunc();
    let current = current_window.trunc();
    match interval {
        Some(interval) => current - last > interval as f64,
        None => current > last,
    }
}
