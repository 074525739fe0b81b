//! The four admission algorithms.
//!
//! Each algorithm is a pure function of the stored state, its configuration
//! and the current time. It returns a [`Decision`]: whether to admit, the
//! diagnostics reported to the caller and the store writes to issue. The
//! orchestrator owns all I/O.

mod borrow;
mod fixed;
mod sliding;
mod token;

use super::limiters::{LimiterConfig, LimiterType};
use super::window::current_window;
use crate::store::UserState;

/// A store write requested by an algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Whole-record overwrite. Not atomic with respect to other writers.
    Exact(UserState),
    /// Atomic add to the `requests` field.
    Relative(i64),
}

/// Outcome of evaluating one limiter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decision {
    pub admitted: bool,
    /// Seconds until a retry could be admitted (set on rejection).
    pub time_left: Option<f64>,
    /// Tokens remaining in the bucket (token limiter only).
    pub tokens_left: Option<f64>,
    /// Seconds until the next replenish tick (token limiter, on admission).
    pub next_replenish_in: Option<f64>,
    /// Writes to apply, in order.
    pub writes: Vec<StoreWrite>,
}

impl Decision {
    /// The wait reported to callers.
    ///
    /// A rejection reports its retry wait. An admitted token check reports
    /// the time until the next replenish instead; the two have different
    /// meanings but share the response field.
    pub fn reported_time_left(&self) -> Option<f64> {
        self.time_left.or(self.next_replenish_in)
    }
}

/// Run the algorithm matching `config`.
pub fn evaluate(state: &UserState, config: &LimiterConfig, now: f64) -> Decision {
    match config {
        LimiterConfig::Fixed(limit) => fixed::evaluate(state, limit, now),
        LimiterConfig::Sliding(limit) => sliding::evaluate(state, limit, now),
        LimiterConfig::Token(limit) => token::evaluate(state, limit, now),
        LimiterConfig::Borrow(limit) => borrow::evaluate(state, limit, now),
    }
}

/// The `last_window` a freshly created state starts from.
///
/// Fixed and token limiters count in interval units; sliding and borrow
/// anchor to raw seconds.
pub fn initial_window(config: &LimiterConfig, now: f64) -> f64 {
    match config.limiter_type() {
        LimiterType::Fixed | LimiterType::Token => current_window(now, config.interval()),
        LimiterType::Sliding | LimiterType::Borrow => current_window(now, None),
    }
}
