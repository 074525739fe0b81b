//! The per-key record kept in the counter store.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LimiterError, Result};
use super::key::StorageKey;
use crate::ratelimit::LimiterType;

/// A store record: a flat map of field name to value.
pub type Record = serde_json::Map<String, Value>;

/// Name of the counter field, the target of relative increments.
pub const REQUESTS_FIELD: &str = "requests";

/// Stored state for one limiter and identifier.
///
/// `requests` means "requests in the current window" for the window
/// algorithms, "tokens consumed" for the token bucket and "lease held"
/// (0 or 1) for borrow. `last_window` is the window marker the algorithm
/// compares against the current time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(default)]
    pub key: String,
    #[serde(rename = "type")]
    pub limiter_type: LimiterType,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub requests: u64,
    #[serde(deserialize_with = "lenient_f64")]
    pub last_window: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_u64"
    )]
    pub interval: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_opt_u64"
    )]
    pub max_tokens: Option<u64>,
}

impl UserState {
    /// A fresh state with no recorded requests.
    pub fn new(key: impl Into<String>, limiter_type: LimiterType, last_window: f64) -> Self {
        Self {
            key: key.into(),
            limiter_type,
            requests: 0,
            last_window,
            interval: None,
            max_tokens: None,
        }
    }

    pub fn with_interval(mut self, interval: Option<u64>) -> Self {
        self.interval = interval;
        self
    }

    /// Decode a record read from `key`.
    ///
    /// Records written without a `key` field take it from the storage key.
    pub fn from_record(key: &StorageKey, record: Record) -> Result<Self> {
        let mut state: UserState = serde_json::from_value(Value::Object(record))
            .map_err(|e| LimiterError::Storage(format!("malformed user state at {}: {}", key, e)))?;
        if state.key.is_empty() {
            state.key = key.as_str().to_string();
        }
        Ok(state)
    }

    /// Encode for a whole-record write.
    pub fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self) {
            Ok(Value::Object(record)) => Ok(record),
            Ok(other) => Err(LimiterError::Storage(format!(
                "user state encoded to non-object value: {}",
                other
            ))),
            Err(e) => Err(LimiterError::Storage(e.to_string())),
        }
    }
}

/// Key-value stores backed by string hashes hand numbers back as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

impl NumberOrString {
    fn into_f64<E: de::Error>(self) -> std::result::Result<f64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| E::custom(format!("invalid number '{}': {}", s, e))),
        }
    }
}

fn to_count<E: de::Error>(value: f64) -> std::result::Result<u64, E> {
    if !value.is_finite() || value < 0.0 {
        return Err(E::custom(format!("expected a non-negative count, got {}", value)));
    }
    Ok(value as u64)
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    NumberOrString::deserialize(deserializer)?.into_f64()
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u64, D::Error> {
    to_count(NumberOrString::deserialize(deserializer)?.into_f64()?)
}

fn lenient_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(value) => Ok(Some(to_count(value.into_f64()?)?)),
        None => Ok(None),
    }
}
