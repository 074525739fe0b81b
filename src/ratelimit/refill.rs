//! Administrative token refill.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};

use super::limiter::Limiter;
use super::limiters::LimiterType;
use crate::error::{LimiterError, Result};
use crate::store::{CounterStore, Identifier, StorageKey, UserState};

impl Limiter {
    /// Reset the consumed count of token limiters to zero.
    ///
    /// `None` targets the global token counter. The refill bypasses the
    /// algorithm entirely: each existing record is overwritten with
    /// `requests = 0`, keeping its window marker. Targets with no record
    /// are skipped since they already read as empty.
    pub async fn refill(&self, targets: Option<&[Identifier]>) -> Result<()> {
        let keys: Vec<StorageKey> = match targets {
            Some(identifiers) => identifiers
                .iter()
                .map(|identifier| self.store().storage_key(LimiterType::Token, identifier))
                .collect(),
            None => vec![self
                .store()
                .storage_key(LimiterType::Token, &Identifier::global())],
        };

        info!(targets = keys.len(), "Refilling tokens");

        self.execution()
            .run("token refill", refill_keys(self.store().clone(), keys))
            .await
    }
}

async fn refill_keys(store: Arc<dyn CounterStore>, keys: Vec<StorageKey>) -> Result<()> {
    try_join_all(keys.into_iter().map(|key| {
        let store = store.clone();
        async move {
            let Some(record) = store.get(&key).await? else {
                debug!(key = %key, "No token state to refill");
                return Ok(());
            };

            let mut state = UserState::from_record(&key, record)?;
            state.requests = 0;
            store.set(&key, state.to_record()?).await?;

            debug!(key = %key, "Tokens refilled");
            Ok::<_, LimiterError>(())
        }
    }))
    .await?;
    Ok(())
}
