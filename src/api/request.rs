//! Wire requests and their validation.

use serde::{Deserialize, Serialize};

use crate::error::{LimiterError, Result};
use crate::ratelimit::{LimiterBatch, LimiterSpec};
use crate::store::Identifier;

/// Maximum number of identifiers in one refill request.
pub const MAX_REFILL_KEYS: usize = 100;

/// A request as sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum LimiterRequest {
    #[serde(rename = "check")]
    Check(CheckRequest),
    #[serde(rename = "refillTokens")]
    RefillTokens(RefillRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_secret: Option<String>,
    pub limiters: Vec<LimiterSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefillRequest {
    /// Identifiers to refill; `None` refills the global counter
    #[serde(default)]
    pub keys: Option<Vec<Identifier>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_secret: Option<String>,
}

/// A request that passed validation, in the form the limiter consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedRequest {
    Check {
        identifier: Identifier,
        batch: LimiterBatch,
    },
    Refill {
        targets: Option<Vec<Identifier>>,
    },
}

impl LimiterRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn action(&self) -> &'static str {
        match self {
            LimiterRequest::Check(_) => "check",
            LimiterRequest::RefillTokens(_) => "refillTokens",
        }
    }

    pub fn invoke_secret(&self) -> Option<&str> {
        match self {
            LimiterRequest::Check(req) => req.invoke_secret.as_deref(),
            LimiterRequest::RefillTokens(req) => req.invoke_secret.as_deref(),
        }
    }

    /// Validate and normalize the request.
    pub fn validate(&self) -> Result<ValidatedRequest> {
        match self {
            LimiterRequest::Check(req) => {
                let batch = LimiterBatch::from_specs(&req.limiters)?;
                let identifier = Identifier::new(
                    req.user_id.clone().filter(|u| !u.is_empty()),
                    trimmed(req.key.as_deref()),
                );
                Ok(ValidatedRequest::Check { identifier, batch })
            }
            LimiterRequest::RefillTokens(req) => {
                let targets = match &req.keys {
                    None => None,
                    Some(keys) if keys.is_empty() || keys.len() > MAX_REFILL_KEYS => {
                        return Err(LimiterError::Validation(format!(
                            "'keys' must contain between 1 and {} entries",
                            MAX_REFILL_KEYS
                        )));
                    }
                    Some(keys) => Some(
                        keys.iter()
                            .map(|k| {
                                Identifier::new(trimmed(k.user_id.as_deref()), trimmed(k.key.as_deref()))
                            })
                            .collect(),
                    ),
                };
                Ok(ValidatedRequest::Refill { targets })
            }
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
