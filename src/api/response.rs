//! Wire responses.

use serde::{Deserialize, Serialize};

use crate::ratelimit::CheckOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Success,
    Limited,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidParams,
    Unauthorized,
}

/// The response returned for every handled request.
///
/// A `limited` result is a successful evaluation and carries status 200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimiterResponse {
    pub result: ResultKind,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    pub message: String,
    pub time_left: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_left: Option<f64>,
}

impl LimiterResponse {
    pub fn from_outcome(outcome: &CheckOutcome) -> Self {
        if outcome.admitted {
            Self {
                result: ResultKind::Success,
                status: 200,
                error: None,
                message: outcome.message(),
                time_left: None,
                tokens_left: outcome.tokens_left,
            }
        } else {
            Self {
                result: ResultKind::Limited,
                status: 200,
                error: None,
                message: outcome.message(),
                time_left: outcome.time_left,
                tokens_left: outcome.tokens_left,
            }
        }
    }

    pub fn refilled() -> Self {
        Self {
            result: ResultKind::Success,
            status: 200,
            error: None,
            message: "Tokens refilled successfully.".to_string(),
            time_left: None,
            tokens_left: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::error(400, ErrorCode::InvalidParams, message.into())
    }

    pub fn unauthorized() -> Self {
        Self::error(401, ErrorCode::Unauthorized, "Invalid invoke secret.".to_string())
    }

    fn error(status: u16, code: ErrorCode, message: String) -> Self {
        Self {
            result: ResultKind::Error,
            status,
            error: Some(code),
            message,
            time_left: None,
            tokens_left: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == ResultKind::Success
    }
}
