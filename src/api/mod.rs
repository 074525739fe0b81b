//! The request/response surface in front of the limiter.

mod request;
mod response;
mod service;

pub use request::{CheckRequest, LimiterRequest, RefillRequest, ValidatedRequest, MAX_REFILL_KEYS};
pub use response::{ErrorCode, LimiterResponse, ResultKind};
pub use service::{BeforeResponse, LimiterService};
