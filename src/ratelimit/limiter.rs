//! The check orchestrator.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, trace};

use super::algorithm::{self, Decision, StoreWrite};
use super::execution::Execution;
use super::limiters::{LimiterBatch, LimiterConfig, LimiterType};
use super::window::{Clock, SystemClock};
use crate::error::{LimiterError, Result};
use crate::store::{CounterStore, Identifier, StorageKey, UserState, REQUESTS_FIELD};

/// The result of one limiter within a check.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterVerdict {
    pub limiter_type: LimiterType,
    pub key: StorageKey,
    pub decision: Decision,
}

impl LimiterVerdict {
    pub fn admitted(&self) -> bool {
        self.decision.admitted
    }
}

/// The aggregated result of a check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// True only if every limiter admitted
    pub admitted: bool,
    /// Largest wait reported by any limiter, rounded to hundredths
    pub time_left: Option<f64>,
    /// Largest token balance reported by any limiter
    pub tokens_left: Option<f64>,
    pub verdicts: Vec<LimiterVerdict>,
}

impl CheckOutcome {
    fn aggregate(verdicts: Vec<LimiterVerdict>) -> Self {
        let admitted = verdicts.iter().all(LimiterVerdict::admitted);
        let time_left = max_of(verdicts.iter().map(|v| v.decision.reported_time_left()));
        let tokens_left = max_of(verdicts.iter().map(|v| v.decision.tokens_left));

        Self {
            admitted,
            time_left,
            tokens_left,
            verdicts,
        }
    }

    /// Number of limiters that denied the request.
    pub fn failed(&self) -> usize {
        self.verdicts.iter().filter(|v| !v.admitted()).count()
    }

    pub fn total(&self) -> usize {
        self.verdicts.len()
    }

    pub fn message(&self) -> String {
        if self.admitted {
            format!("Every limiter passed ({}).", self.total())
        } else {
            format!(
                "{} of {} limiter{} did not pass.",
                self.failed(),
                self.total(),
                if self.total() == 1 { "" } else { "s" }
            )
        }
    }
}

fn max_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    values
        .flatten()
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
        .map(|v| (v * 100.0).round() / 100.0)
}

/// Evaluates requests against a batch of limiters backed by a counter store.
///
/// The limiter holds no per-key state; everything lives in the store.
pub struct Limiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    execution: Execution,
}

impl Limiter {
    /// Create a limiter on the system clock with synchronous writes.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            execution: Execution::Synchronous,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    /// Check a request against every limiter in the batch.
    ///
    /// Limiters are evaluated concurrently against one sampled time and
    /// their writes are issued according to the execution mode. Store
    /// failures abort the check.
    pub async fn check(&self, identifier: &Identifier, batch: &LimiterBatch) -> Result<CheckOutcome> {
        let now = self.clock.now();

        let verdicts = try_join_all(
            batch
                .iter()
                .map(|config| self.evaluate_limiter(identifier, config, now)),
        )
        .await?;

        let outcome = CheckOutcome::aggregate(verdicts);

        let pending: Vec<(StorageKey, Vec<StoreWrite>)> = outcome
            .verdicts
            .iter()
            .filter(|v| !v.decision.writes.is_empty())
            .map(|v| (v.key.clone(), v.decision.writes.clone()))
            .collect();

        if !pending.is_empty() {
            self.execution
                .run("limiter writes", apply_writes(self.store.clone(), pending))
                .await?;
        }

        debug!(
            user_id = ?identifier.user_id,
            key = ?identifier.key,
            admitted = outcome.admitted,
            failed = outcome.failed(),
            total = outcome.total(),
            "Check evaluated"
        );

        Ok(outcome)
    }

    async fn evaluate_limiter(
        &self,
        identifier: &Identifier,
        config: &LimiterConfig,
        now: f64,
    ) -> Result<LimiterVerdict> {
        let key = self.store.storage_key(config.limiter_type(), identifier);
        let state = self.load_or_init(&key, config, now).await?;
        let decision = algorithm::evaluate(&state, config, now);

        trace!(
            key = %key,
            limiter = %config.limiter_type(),
            requests = state.requests,
            last_window = state.last_window,
            admitted = decision.admitted,
            "Limiter evaluated"
        );

        Ok(LimiterVerdict {
            limiter_type: config.limiter_type(),
            key,
            decision,
        })
    }

    /// Read a limiter's state, creating and storing a fresh one on first use.
    async fn load_or_init(&self, key: &StorageKey, config: &LimiterConfig, now: f64) -> Result<UserState> {
        if let Some(record) = self.store.get(key).await? {
            return UserState::from_record(key, record);
        }

        let state = UserState::new(
            key.as_str(),
            config.limiter_type(),
            algorithm::initial_window(config, now),
        )
        .with_interval(config.interval());

        self.store.set(key, state.to_record()?).await?;
        debug!(key = %key, last_window = state.last_window, "Created user state");
        Ok(state)
    }
}

impl std::fmt::Debug for Limiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Limiter")
            .field("execution", &self.execution)
            .finish()
    }
}

/// Apply each key's writes in order; distinct keys in parallel.
async fn apply_writes(
    store: Arc<dyn CounterStore>,
    pending: Vec<(StorageKey, Vec<StoreWrite>)>,
) -> Result<()> {
    try_join_all(pending.into_iter().map(|(key, writes)| {
        let store = store.clone();
        async move {
            for write in writes {
                match write {
                    StoreWrite::Exact(state) => store.set(&key, state.to_record()?).await?,
                    StoreWrite::Relative(amount) => {
                        store.relative_increment(&key, REQUESTS_FIELD, amount).await?
                    }
                }
            }
            Ok::<_, LimiterError>(())
        }
    }))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::limiters::{BorrowAction, BorrowLimit, TokenLimit, WindowLimit};
    use crate::ratelimit::window::ManualClock;
    use crate::ratelimit::DeferredExecutor;
    use crate::store::{MemoryStore, Record};
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;

    fn setup(now: f64) -> (Limiter, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(now));
        let limiter = Limiter::new(store.clone()).with_clock(clock.clone());
        (limiter, store, clock)
    }

    fn user(user_id: &str) -> Identifier {
        Identifier::new(Some(user_id.to_string()), None)
    }

    fn fixed(max_requests: u64, interval: u64) -> LimiterConfig {
        LimiterConfig::Fixed(WindowLimit {
            max_requests,
            interval,
        })
    }

    fn token(max_tokens: u64, tokens_per_replenish: u64, tokens_cost: u64, interval: u64) -> LimiterConfig {
        LimiterConfig::Token(TokenLimit {
            max_tokens,
            tokens_per_replenish,
            tokens_cost,
            interval,
        })
    }

    fn borrow(action: BorrowAction) -> LimiterConfig {
        LimiterConfig::Borrow(BorrowLimit {
            timeout: 30,
            action,
        })
    }

    fn batch(limiters: Vec<LimiterConfig>) -> LimiterBatch {
        LimiterBatch::new(limiters).unwrap()
    }

    #[tokio::test]
    async fn test_fixed_window_scenario() {
        let (limiter, _store, clock) = setup(0.0);
        let limits = batch(vec![fixed(2, 60)]);
        let id = user("u1");

        assert!(limiter.check(&id, &limits).await.unwrap().admitted);
        clock.set(1.0);
        assert!(limiter.check(&id, &limits).await.unwrap().admitted);
        clock.set(2.0);

        let outcome = limiter.check(&id, &limits).await.unwrap();
        assert!(!outcome.admitted);
        assert_eq!(outcome.time_left, Some(58.0));
        assert_eq!(outcome.message(), "1 of 1 limiter did not pass.");
    }

    #[tokio::test]
    async fn test_first_check_creates_state() {
        let (limiter, store, _clock) = setup(120.0);
        let id = user("u1");

        limiter.check(&id, &batch(vec![fixed(5, 60)])).await.unwrap();

        let key = StorageKey::derive(LimiterType::Fixed, &id);
        let state = store.state(&key).unwrap();
        assert_eq!(state.requests, 1);
        assert_eq!(state.last_window, 2.0);
        assert_eq!(state.interval, Some(60));
        assert_eq!(state.key, "count:user:fixed:u1");
    }

    #[tokio::test]
    async fn test_token_bucket_scenario() {
        let (limiter, _store, clock) = setup(0.0);
        let limits = batch(vec![token(5, 1, 2, 60)]);
        let id = Identifier::new(None, Some("export".to_string()));

        let first = limiter.check(&id, &limits).await.unwrap();
        assert!(first.admitted);
        assert_eq!(first.tokens_left, Some(3.0));

        assert!(limiter.check(&id, &limits).await.unwrap().admitted);

        let third = limiter.check(&id, &limits).await.unwrap();
        assert!(!third.admitted);
        assert_eq!(third.tokens_left, Some(1.0));

        clock.set(65.0);
        let fourth = limiter.check(&id, &limits).await.unwrap();
        assert!(fourth.admitted);
        assert_eq!(fourth.tokens_left, Some(0.0));
    }

    #[tokio::test]
    async fn test_borrow_scenario() {
        let (limiter, _store, clock) = setup(0.0);
        let start = batch(vec![borrow(BorrowAction::Start)]);
        let end = batch(vec![borrow(BorrowAction::End)]);
        let id = user("worker");

        assert!(limiter.check(&id, &start).await.unwrap().admitted);

        clock.set(10.0);
        let contended = limiter.check(&id, &start).await.unwrap();
        assert!(!contended.admitted);
        assert_eq!(contended.time_left, Some(20.0));

        clock.set(40.0);
        assert!(limiter.check(&id, &start).await.unwrap().admitted);

        clock.set(41.0);
        assert!(limiter.check(&id, &end).await.unwrap().admitted);
        assert!(limiter.check(&id, &start).await.unwrap().admitted);
    }

    #[tokio::test]
    async fn test_request_needs_every_limiter() {
        let (limiter, store, _clock) = setup(0.0);
        let limits = batch(vec![fixed(1, 60), token(10, 1, 1, 30)]);
        let id = user("u1");

        let first = limiter.check(&id, &limits).await.unwrap();
        assert!(first.admitted);
        assert_eq!(first.message(), "Every limiter passed (2).");
        assert_eq!(store.len(), 2);

        let second = limiter.check(&id, &limits).await.unwrap();
        assert!(!second.admitted);
        assert_eq!(second.failed(), 1);
        assert_eq!(second.message(), "1 of 2 limiters did not pass.");
        // Worst case wins: 60s fixed window vs 30s replenish tick
        assert_eq!(second.time_left, Some(60.0));
        assert_eq!(second.tokens_left, Some(8.0));

        let fixed_verdict = second
            .verdicts
            .iter()
            .find(|v| v.limiter_type == LimiterType::Fixed)
            .unwrap();
        assert!(!fixed_verdict.admitted());
    }

    #[tokio::test]
    async fn test_batch_limiters_use_disjoint_keys() {
        let (limiter, store, _clock) = setup(1000.0);
        let limits = batch(vec![
            fixed(5, 60),
            LimiterConfig::Sliding(WindowLimit {
                max_requests: 5,
                interval: 60,
            }),
            token(5, 1, 1, 60),
            borrow(BorrowAction::Start),
        ]);

        let outcome = limiter.check(&user("u1"), &limits).await.unwrap();
        assert!(outcome.admitted);
        assert_eq!(store.len(), 4);
    }

    #[derive(Default)]
    struct QueuedExecutor {
        tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl DeferredExecutor for Arc<QueuedExecutor> {
        fn submit(&self, task: BoxFuture<'static, ()>) {
            self.tasks.lock().push(task);
        }
    }

    impl QueuedExecutor {
        async fn drain(&self) {
            let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
            for task in tasks {
                task.await;
            }
        }
    }

    #[tokio::test]
    async fn test_deferred_writes_run_on_executor() {
        let queue = Arc::new(QueuedExecutor::default());
        let (limiter, store, _clock) = setup(0.0);
        let limiter = limiter.with_execution(Execution::deferred(queue.clone()));
        let id = user("u1");
        let key = StorageKey::derive(LimiterType::Fixed, &id);

        let outcome = limiter.check(&id, &batch(vec![fixed(3, 60)])).await.unwrap();
        assert!(outcome.admitted);
        // State was created inline, the increment is still queued
        assert_eq!(store.state(&key).unwrap().requests, 0);

        queue.drain().await;
        assert_eq!(store.state(&key).unwrap().requests, 1);
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn get(&self, _key: &StorageKey) -> Result<Option<Record>> {
            Err(LimiterError::Storage("connection refused".to_string()))
        }

        async fn set(&self, _key: &StorageKey, _record: Record) -> Result<()> {
            Err(LimiterError::Storage("connection refused".to_string()))
        }

        async fn relative_increment(&self, _key: &StorageKey, _field: &str, _amount: i64) -> Result<()> {
            Err(LimiterError::Storage("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_check() {
        let limiter = Limiter::new(Arc::new(BrokenStore));
        let result = limiter.check(&user("u1"), &batch(vec![fixed(1, 60)])).await;
        assert!(matches!(result, Err(LimiterError::Storage(_))));
    }

    #[tokio::test]
    async fn test_check_reads_records_without_key_field() {
        let (limiter, store, _clock) = setup(0.0);
        let id = user("u1");
        let key = StorageKey::derive(LimiterType::Fixed, &id);

        let mut record = Record::new();
        record.insert("type".into(), serde_json::json!("fixed"));
        record.insert("requests".into(), serde_json::json!(1));
        record.insert("lastWindow".into(), serde_json::json!(0.0));
        store.set(&key, record).await.unwrap();

        let outcome = limiter.check(&id, &batch(vec![fixed(2, 60)])).await.unwrap();
        assert!(outcome.admitted);
        assert_eq!(store.state(&key).unwrap().requests, 2);
    }

    #[test]
    fn test_max_of_ignores_missing_values() {
        assert_eq!(max_of(vec![None, Some(1.0), Some(3.456), None].into_iter()), Some(3.46));
        assert_eq!(max_of(vec![None, None].into_iter()), None);
    }
}
