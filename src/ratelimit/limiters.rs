//! Limiter configuration types.
//!
//! [`LimiterSpec`] is the shape accepted from requests and policy files:
//! intervals may be named units and numbers are not yet checked.
//! [`LimiterConfig`] is the normalized form the algorithms consume, and
//! [`LimiterBatch`] carries the 1..=4 unique-type invariant.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{LimiterError, Result};

/// Maximum number of limiters evaluated for a single request.
pub const MAX_LIMITERS: usize = 4;

/// The four admission algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimiterType {
    Fixed,
    Sliding,
    Token,
    Borrow,
}

impl LimiterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterType::Fixed => "fixed",
            LimiterType::Sliding => "sliding",
            LimiterType::Token => "token",
            LimiterType::Borrow => "borrow",
        }
    }
}

impl fmt::Display for LimiterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named interval units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Length of this unit in seconds.
    pub fn as_secs(&self) -> u64 {
        match self {
            TimeUnit::Minute => 60,
            TimeUnit::Hour => 60 * 60,
            TimeUnit::Day => 60 * 60 * 24,
        }
    }
}

/// An interval as written by callers: a named unit or a number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Interval {
    Unit(TimeUnit),
    Seconds(i64),
}

impl Interval {
    /// Normalize to a positive number of seconds.
    pub fn to_secs(&self) -> Result<u64> {
        match *self {
            Interval::Unit(unit) => Ok(unit.as_secs()),
            Interval::Seconds(secs) => positive("interval", secs),
        }
    }
}

impl From<TimeUnit> for Interval {
    fn from(unit: TimeUnit) -> Self {
        Interval::Unit(unit)
    }
}

/// Which side of a lease a borrow check represents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowAction {
    #[default]
    Start,
    End,
}

/// A limiter as it appears on the wire or in a policy file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LimiterSpec {
    Fixed {
        #[serde(rename = "maxRequests")]
        max_requests: i64,
        interval: Interval,
    },
    Sliding {
        #[serde(rename = "maxRequests")]
        max_requests: i64,
        interval: Interval,
    },
    Token {
        #[serde(rename = "maxTokens")]
        max_tokens: i64,
        #[serde(rename = "tokensPerReplenish")]
        tokens_per_replenish: i64,
        #[serde(rename = "tokensCost")]
        tokens_cost: i64,
        interval: Interval,
    },
    Borrow {
        #[serde(rename = "borrowAction", alias = "action", default)]
        action: BorrowAction,
        timeout: i64,
    },
}

impl LimiterSpec {
    pub fn limiter_type(&self) -> LimiterType {
        match self {
            LimiterSpec::Fixed { .. } => LimiterType::Fixed,
            LimiterSpec::Sliding { .. } => LimiterType::Sliding,
            LimiterSpec::Token { .. } => LimiterType::Token,
            LimiterSpec::Borrow { .. } => LimiterType::Borrow,
        }
    }

    /// Check numeric fields and convert intervals to seconds.
    pub fn normalize(&self) -> Result<LimiterConfig> {
        let config = match *self {
            LimiterSpec::Fixed {
                max_requests,
                interval,
            } => LimiterConfig::Fixed(WindowLimit {
                max_requests: positive("maxRequests", max_requests)?,
                interval: interval.to_secs()?,
            }),
            LimiterSpec::Sliding {
                max_requests,
                interval,
            } => LimiterConfig::Sliding(WindowLimit {
                max_requests: positive("maxRequests", max_requests)?,
                interval: interval.to_secs()?,
            }),
            LimiterSpec::Token {
                max_tokens,
                tokens_per_replenish,
                tokens_cost,
                interval,
            } => LimiterConfig::Token(TokenLimit {
                max_tokens: positive("maxTokens", max_tokens)?,
                tokens_per_replenish: positive("tokensPerReplenish", tokens_per_replenish)?,
                tokens_cost: positive("tokensCost", tokens_cost)?,
                interval: interval.to_secs()?,
            }),
            LimiterSpec::Borrow { action, timeout } => LimiterConfig::Borrow(BorrowLimit {
                timeout: positive("timeout", timeout)?,
                action,
            }),
        };
        Ok(config)
    }
}

fn positive(field: &str, value: i64) -> Result<u64> {
    if value <= 0 {
        return Err(LimiterError::Validation(format!(
            "'{}' must be a positive integer, got {}",
            field, value
        )));
    }
    Ok(value as u64)
}

/// Limit shared by the fixed and sliding window algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    pub max_requests: u64,
    /// Window length in seconds
    pub interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLimit {
    pub max_tokens: u64,
    pub tokens_per_replenish: u64,
    pub tokens_cost: u64,
    /// Replenish tick length in seconds
    pub interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowLimit {
    /// Seconds after which an unreleased lease may be taken over
    pub timeout: u64,
    pub action: BorrowAction,
}

/// A normalized limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterConfig {
    Fixed(WindowLimit),
    Sliding(WindowLimit),
    Token(TokenLimit),
    Borrow(BorrowLimit),
}

impl LimiterConfig {
    pub fn limiter_type(&self) -> LimiterType {
        match self {
            LimiterConfig::Fixed(_) => LimiterType::Fixed,
            LimiterConfig::Sliding(_) => LimiterType::Sliding,
            LimiterConfig::Token(_) => LimiterType::Token,
            LimiterConfig::Borrow(_) => LimiterType::Borrow,
        }
    }

    /// Interval in seconds, for limiters that have one.
    pub fn interval(&self) -> Option<u64> {
        match self {
            LimiterConfig::Fixed(limit) | LimiterConfig::Sliding(limit) => Some(limit.interval),
            LimiterConfig::Token(limit) => Some(limit.interval),
            LimiterConfig::Borrow(_) => None,
        }
    }
}

/// The limiters evaluated together for one request.
///
/// Holds between 1 and [`MAX_LIMITERS`] configurations with pairwise
/// distinct types, so every limiter in a batch maps to its own storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterBatch {
    limiters: Vec<LimiterConfig>,
}

impl LimiterBatch {
    pub fn new(limiters: Vec<LimiterConfig>) -> Result<Self> {
        if limiters.is_empty() {
            return Err(LimiterError::Validation(
                "You must provide at least 1 limiter configuration".to_string(),
            ));
        }
        if limiters.len() > MAX_LIMITERS {
            return Err(LimiterError::Validation(format!(
                "You can provide at most {} limiter configurations",
                MAX_LIMITERS
            )));
        }

        let mut seen = HashSet::with_capacity(limiters.len());
        for limiter in &limiters {
            if !seen.insert(limiter.limiter_type()) {
                return Err(LimiterError::Validation(format!(
                    "All limiters must have a unique 'type', '{}' appears more than once",
                    limiter.limiter_type()
                )));
            }
        }

        Ok(Self { limiters })
    }

    /// Normalize and validate a list of wire specs.
    pub fn from_specs(specs: &[LimiterSpec]) -> Result<Self> {
        let limiters = specs
            .iter()
            .map(LimiterSpec::normalize)
            .collect::<Result<Vec<_>>>()?;
        Self::new(limiters)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LimiterConfig> {
        self.limiters.iter()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(max_requests: u64, interval: u64) -> LimiterConfig {
        LimiterConfig::Fixed(WindowLimit {
            max_requests,
            interval,
        })
    }

    fn borrow() -> LimiterConfig {
        LimiterConfig::Borrow(BorrowLimit {
            timeout: 30,
            action: BorrowAction::Start,
        })
    }

    #[test]
    fn test_time_unit_secs() {
        assert_eq!(TimeUnit::Minute.as_secs(), 60);
        assert_eq!(TimeUnit::Hour.as_secs(), 3600);
        assert_eq!(TimeUnit::Day.as_secs(), 86400);
    }

    #[test]
    fn test_parse_named_and_numeric_intervals() {
        let spec: LimiterSpec =
            serde_json::from_str(r#"{"type":"fixed","maxRequests":10,"interval":"hour"}"#)
                .unwrap();
        assert_eq!(spec.normalize().unwrap(), fixed(10, 3600));

        let spec: LimiterSpec =
            serde_json::from_str(r#"{"type":"sliding","maxRequests":3,"interval":90}"#).unwrap();
        assert_eq!(
            spec.normalize().unwrap(),
            LimiterConfig::Sliding(WindowLimit {
                max_requests: 3,
                interval: 90
            })
        );
    }

    #[test]
    fn test_unknown_interval_unit_rejected() {
        let parsed = serde_json::from_str::<LimiterSpec>(
            r#"{"type":"fixed","maxRequests":10,"interval":"week"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let spec: LimiterSpec =
            serde_json::from_str(r#"{"type":"fixed","maxRequests":0,"interval":60}"#).unwrap();
        assert!(matches!(spec.normalize(), Err(LimiterError::Validation(_))));

        let spec: LimiterSpec =
            serde_json::from_str(r#"{"type":"borrow","timeout":-5}"#).unwrap();
        assert!(matches!(spec.normalize(), Err(LimiterError::Validation(_))));
    }

    #[test]
    fn test_borrow_action_defaults_to_start() {
        let spec: LimiterSpec = serde_json::from_str(r#"{"type":"borrow","timeout":30}"#).unwrap();
        assert_eq!(spec.normalize().unwrap(), borrow());

        let spec: LimiterSpec =
            serde_json::from_str(r#"{"type":"borrow","borrowAction":"end","timeout":30}"#)
                .unwrap();
        assert_eq!(
            spec.normalize().unwrap(),
            LimiterConfig::Borrow(BorrowLimit {
                timeout: 30,
                action: BorrowAction::End
            })
        );
    }

    #[test]
    fn test_batch_rejects_empty_and_oversized() {
        assert!(LimiterBatch::new(Vec::new()).is_err());

        let five = vec![fixed(1, 1), fixed(1, 2), fixed(1, 3), fixed(1, 4), fixed(1, 5)];
        assert!(LimiterBatch::new(five).is_err());
    }

    #[test]
    fn test_batch_rejects_duplicate_types() {
        let result = LimiterBatch::new(vec![fixed(5, 60), borrow(), fixed(10, 3600)]);
        match result {
            Err(LimiterError::Validation(msg)) => assert!(msg.contains("fixed")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_accepts_all_four_types() {
        let batch = LimiterBatch::new(vec![
            fixed(5, 60),
            LimiterConfig::Sliding(WindowLimit {
                max_requests: 5,
                interval: 60,
            }),
            LimiterConfig::Token(TokenLimit {
                max_tokens: 10,
                tokens_per_replenish: 1,
                tokens_cost: 1,
                interval: 60,
            }),
            borrow(),
        ])
        .unwrap();
        assert_eq!(batch.len(), 4);
    }
}
