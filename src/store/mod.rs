//! Counter store contract and the in-process reference backend.
//!
//! The store is the only shared mutable resource. The limiter keeps no
//! cache of its own and takes no locks; the one concurrency-safe primitive
//! it relies on is [`CounterStore::relative_increment`].

mod key;
mod memory;
mod state;

use async_trait::async_trait;

use crate::error::Result;
use crate::ratelimit::LimiterType;

pub use key::{Identifier, StorageKey};
pub use memory::MemoryStore;
pub use state::{Record, UserState, REQUESTS_FIELD};

/// Trait for counter store backends.
///
/// `get` and `set` are plain whole-record reads and overwrites with no
/// compare-and-swap; `relative_increment` must be atomic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Key a limiter's state is stored under.
    fn storage_key(&self, limiter_type: LimiterType, identifier: &Identifier) -> StorageKey {
        StorageKey::derive(limiter_type, identifier)
    }

    /// Read a whole record, `None` if the key has never been written.
    async fn get(&self, key: &StorageKey) -> Result<Option<Record>>;

    /// Replace a whole record.
    async fn set(&self, key: &StorageKey, record: Record) -> Result<()>;

    /// Atomically add `amount` to one numeric field of a record.
    async fn relative_increment(&self, key: &StorageKey, field: &str, amount: i64) -> Result<()>;
}
