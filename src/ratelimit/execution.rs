//! Synchronous or deferred execution of store writes and hooks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::warn;

use crate::error::Result;

/// Runs work the caller does not wait for.
///
/// Serverless runtimes usually expose this as a "wait until" style hook.
/// Work handed over here has no durability guarantee.
pub trait DeferredExecutor: Send + Sync {
    fn submit(&self, task: BoxFuture<'static, ()>);
}

/// Spawns deferred work onto a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl DeferredExecutor for TokioExecutor {
    fn submit(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

/// How store writes and the pre-response hook are run.
#[derive(Clone, Default)]
pub enum Execution {
    /// Await the work before returning.
    #[default]
    Synchronous,
    /// Hand the work to an executor and return immediately. Failures are
    /// logged, never reported to the caller.
    Deferred(Arc<dyn DeferredExecutor>),
}

impl Execution {
    pub fn deferred(executor: impl DeferredExecutor + 'static) -> Self {
        Execution::Deferred(Arc::new(executor))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Execution::Deferred(_))
    }

    /// Run `work` according to the execution mode.
    ///
    /// `what` names the work in logs when a deferred task fails.
    pub async fn run<F>(&self, what: &'static str, work: F) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        match self {
            Execution::Synchronous => work.await,
            Execution::Deferred(executor) => {
                executor.submit(Box::pin(async move {
                    if let Err(e) = work.await {
                        warn!(task = what, error = %e, "Deferred task failed");
                    }
                }));
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Synchronous => f.write_str("Synchronous"),
            Execution::Deferred(_) => f.write_str("Deferred"),
        }
    }
}
