//! Configuration management.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{LimiterError, Result};

/// Environment variable holding the shared invoke secret.
pub const INVOKE_SECRET_ENV: &str = "BORROW_LIMITER_INVOKE_SECRET";

/// Prefix for layered environment overrides, e.g. `LIMITER__LOGGING__LEVEL`.
const ENV_PREFIX: &str = "LIMITER";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Limiter behaviour
    #[serde(default)]
    pub limiter: LimiterSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How store writes and hooks are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Synchronous,
    Deferred,
}

/// Limiter settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// When set, every request must present this secret
    #[serde(default)]
    pub invoke_secret: Option<String>,

    #[serde(default)]
    pub execution: ExecutionMode,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| LimiterError::Config(e.to_string()))
    }

    /// Load layered configuration: defaults, then the optional file, then
    /// `LIMITER__*` environment variables, then the invoke secret variable.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let mut loaded: ServiceConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LimiterError::Config(e.to_string()))?;

        if let Ok(secret) = std::env::var(INVOKE_SECRET_ENV) {
            loaded.limiter.invoke_secret = Some(secret);
        }
        Ok(loaded)
    }
}
