//! Identifier and storage key derivation.

use serde::{Deserialize, Serialize};

use crate::ratelimit::LimiterType;

/// Who a request is counted against.
///
/// Either part may be absent; all four combinations are valid and map to
/// distinct storage keys. With neither part the request counts against a
/// single global counter per limiter type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    /// End-user identifier (user ID, email, ...)
    #[serde(default)]
    pub user_id: Option<String>,
    /// Limiter scope (e.g. "download_file" or a route)
    #[serde(default)]
    pub key: Option<String>,
}

impl Identifier {
    pub fn new(user_id: Option<String>, key: Option<String>) -> Self {
        Self { user_id, key }
    }

    /// The identifier of the global counter.
    pub fn global() -> Self {
        Self::default()
    }

    pub fn is_global(&self) -> bool {
        self.user_id.is_none() && self.key.is_none()
    }
}

/// The key a limiter's [`UserState`](super::UserState) is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the key for a limiter type and identifier.
    ///
    /// The limiter type is always part of the key, so the limiters of one
    /// batch never share a record.
    pub fn derive(limiter_type: LimiterType, identifier: &Identifier) -> Self {
        let ty = limiter_type.as_str();
        let key = match (identifier.user_id.as_deref(), identifier.key.as_deref()) {
            (None, None) => format!("count:global:{}", ty),
            (Some(user_id), None) => format!("count:user:{}:{}", ty, user_id),
            (Some(user_id), Some(key)) => format!("count:user-key:{}:{}:{}", key, ty, user_id),
            (None, Some(key)) => format!("count:key:{}:{}", key, ty),
        };
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StorageKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl std::fmt::Display for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
