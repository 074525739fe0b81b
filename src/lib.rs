//! Borrow Limiter - a rate limiting engine
//!
//! Checks a batch of up to four limiters (fixed window, sliding window,
//! token bucket and borrow/lease) against a pluggable counter store and
//! folds the individual decisions into a single verdict.

pub mod api;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;
