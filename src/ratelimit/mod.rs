//! The limiting engine: configuration, window arithmetic, algorithms and
//! the check/refill orchestrator.

pub mod algorithm;
mod execution;
mod limiter;
mod limiters;
mod policy;
mod refill;
mod window;

pub use algorithm::{Decision, StoreWrite};
pub use execution::{DeferredExecutor, Execution, TokioExecutor};
pub use limiter::{CheckOutcome, Limiter, LimiterVerdict};
pub use limiters::{
    BorrowAction, BorrowLimit, Interval, LimiterBatch, LimiterConfig, LimiterSpec, LimiterType,
    TimeUnit, TokenLimit, WindowLimit, MAX_LIMITERS,
};
pub use policy::PolicySet;
pub use window::{current_window, is_new_window, Clock, ManualClock, SystemClock};
