//! Error types for the limiter.

use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// Malformed request, over-sized batch or duplicate limiter types
    #[error("Invalid parameters: {0}")]
    Validation(String),

    /// Invoke secret missing or mismatched
    #[error("Invalid invoke secret.")]
    Unauthorized,

    /// Counter store get/set/increment failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pre-response hook failure
    #[error("Hook error: {0}")]
    Hook(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LimiterError {
    /// Response status code a transport should use for this error.
    pub fn status(&self) -> u16 {
        match self {
            LimiterError::Validation(_) => 400,
            LimiterError::Unauthorized => 401,
            _ => 500,
        }
    }
}

impl From<serde_json::Error> for LimiterError {
    fn from(err: serde_json::Error) -> Self {
        LimiterError::Validation(err.to_string())
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
