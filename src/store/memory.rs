//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::trace;

use super::{CounterStore, Record, StorageKey, UserState};
use crate::error::{LimiterError, Result};

/// A [`CounterStore`] kept in a concurrent hash map.
///
/// Relative increments hold the key's shard lock for the read-add-write,
/// so concurrent increments on one key are never lost. Useful for tests,
/// single-process deployments and the CLI.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<String, Record>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded state at a key, if any.
    pub fn state(&self, key: &StorageKey) -> Option<UserState> {
        let record = self.records.get(key.as_str())?.clone();
        UserState::from_record(key, record).ok()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &StorageKey) -> Result<Option<Record>> {
        Ok(self.records.get(key.as_str()).map(|r| r.clone()))
    }

    async fn set(&self, key: &StorageKey, record: Record) -> Result<()> {
        self.records.insert(key.as_str().to_string(), record);
        Ok(())
    }

    async fn relative_increment(&self, key: &StorageKey, field: &str, amount: i64) -> Result<()> {
        let mut record = self.records.entry(key.as_str().to_string()).or_default();

        let current = match record.get(field) {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_i64().ok_or_else(|| {
                LimiterError::Storage(format!("field '{}' at {} is not an integer", field, key))
            })?,
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|e| {
                LimiterError::Storage(format!("field '{}' at {}: {}", field, key, e))
            })?,
            Some(other) => {
                return Err(LimiterError::Storage(format!(
                    "field '{}' at {} is not numeric: {}",
                    field, key, other
                )))
            }
        };

        let updated = current + amount;
        record.insert(field.to_string(), Value::from(updated));

        trace!(key = %key, field = field, value = updated, "Relative increment applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::LimiterType;
    use crate::store::REQUESTS_FIELD;
    use serde_json::json;
    use std::sync::Arc;

    fn key(name: &str) -> StorageKey {
        StorageKey::from(name.to_string())
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let store = MemoryStore::new();
        assert!(store.get(&key("missing")).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_replaces_whole_record() {
        let store = MemoryStore::new();
        let k = key("count:global:fixed");

        let mut first = Record::new();
        first.insert("requests".into(), json!(4));
        first.insert("extra".into(), json!(true));
        store.set(&k, first).await.unwrap();

        let mut second = Record::new();
        second.insert("requests".into(), json!(0));
        store.set(&k, second).await.unwrap();

        let stored = store.get(&k).await.unwrap().unwrap();
        assert_eq!(stored.get("requests"), Some(&json!(0)));
        assert!(!stored.contains_key("extra"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_relative_increment_updates_state() {
        let store = MemoryStore::new();
        let state = UserState::new("count:key:k:fixed", LimiterType::Fixed, 100.0);
        let k = key(&state.key);

        store.set(&k, state.to_record().unwrap()).await.unwrap();
        store.relative_increment(&k, REQUESTS_FIELD, 1).await.unwrap();
        store.relative_increment(&k, REQUESTS_FIELD, 2).await.unwrap();

        let state = store.state(&k).unwrap();
        assert_eq!(state.requests, 3);
        assert_eq!(state.last_window, 100.0);
    }

    #[tokio::test]
    async fn test_relative_increment_creates_field() {
        let store = MemoryStore::new();
        let k = key("fresh");

        store.relative_increment(&k, "hits", 5).await.unwrap();

        let record = store.get(&k).await.unwrap().unwrap();
        assert_eq!(record.get("hits"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());
        let k = key("contended");

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                let k = k.clone();
                tokio::spawn(async move { store.relative_increment(&k, REQUESTS_FIELD, 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = store.get(&k).await.unwrap().unwrap();
        assert_eq!(record.get(REQUESTS_FIELD), Some(&json!(50)));
    }

    #[test]
    fn test_clear() {
        let store = MemoryStore::new();
        tokio_test::block_on(async {
            store.relative_increment(&key("a"), "n", 1).await.unwrap();
            store.relative_increment(&key("b"), "n", 1).await.unwrap();
        });
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.is_empty());
    }
}
