//! Named limiter policies.
//!
//! A policy file maps names to limiter batches so callers can refer to
//! "upload" instead of repeating the limiter list:
//!
//! ```yaml
//! policies:
//!   upload:
//!     - type: fixed
//!       maxRequests: 10
//!       interval: minute
//!     - type: borrow
//!       timeout: 30
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use super::limiters::{LimiterBatch, LimiterSpec};
use crate::error::{LimiterError, Result};

/// A set of named limiter batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub policies: BTreeMap<String, Vec<LimiterSpec>>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load policies from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter policies");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse policies from YAML and check that every batch is valid.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let set: PolicySet = serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse policies: {}", e)))?;

        for (name, specs) in &set.policies {
            LimiterBatch::from_specs(specs).map_err(|e| {
                LimiterError::Config(format!("Policy '{}' is invalid: {}", name, e))
            })?;
        }
        Ok(set)
    }

    /// The validated batch for a policy.
    pub fn batch(&self, name: &str) -> Result<LimiterBatch> {
        let specs = self
            .policies
            .get(name)
            .ok_or_else(|| LimiterError::Config(format!("Unknown policy '{}'", name)))?;
        LimiterBatch::from_specs(specs)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}
