//! Request handling: validation, the invoke secret gate and the
//! pre-response hook around the limiter.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::request::{LimiterRequest, ValidatedRequest};
use super::response::LimiterResponse;
use crate::config::{ExecutionMode, ServiceConfig};
use crate::error::Result;
use crate::ratelimit::{Execution, Limiter, TokioExecutor};
use crate::store::CounterStore;

/// Hook invoked with every response before it is returned.
///
/// Runs through the limiter's execution mode. Failures are logged and
/// never change the response.
#[async_trait]
pub trait BeforeResponse: Send + Sync {
    async fn before_response(&self, response: &LimiterResponse) -> Result<()>;
}

/// Handles limiter requests end to end.
pub struct LimiterService {
    limiter: Limiter,
    invoke_secret: Option<String>,
    hook: Option<Arc<dyn BeforeResponse>>,
}

impl LimiterService {
    pub fn new(limiter: Limiter) -> Self {
        Self {
            limiter,
            invoke_secret: None,
            hook: None,
        }
    }

    /// Build a service from configuration.
    ///
    /// Deferred execution spawns onto the current Tokio runtime, so this
    /// must be called from within one.
    pub fn from_config(config: &ServiceConfig, store: Arc<dyn CounterStore>) -> Self {
        let execution = match config.limiter.execution {
            ExecutionMode::Synchronous => Execution::Synchronous,
            ExecutionMode::Deferred => Execution::deferred(TokioExecutor::current()),
        };

        Self {
            limiter: Limiter::new(store).with_execution(execution),
            invoke_secret: config.limiter.invoke_secret.clone(),
            hook: None,
        }
    }

    pub fn with_invoke_secret(mut self, secret: impl Into<String>) -> Self {
        self.invoke_secret = Some(secret.into());
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn BeforeResponse>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    /// Handle a JSON request body.
    pub async fn handle_json(&self, body: &str) -> Result<LimiterResponse> {
        match LimiterRequest::from_json(body) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "Received malformed limiter request");
                self.respond(LimiterResponse::invalid_params(e.to_string())).await
            }
        }
    }

    /// Handle a parsed request.
    ///
    /// Validation and authorization failures become error responses.
    /// Store failures are returned as `Err`.
    #[instrument(
        skip(self, request),
        fields(request_id = %Uuid::new_v4(), action = request.action())
    )]
    pub async fn handle(&self, request: LimiterRequest) -> Result<LimiterResponse> {
        let validated = match request.validate() {
            Ok(validated) => validated,
            Err(e) => {
                warn!(error = %e, "Rejected invalid limiter request");
                return self.respond(LimiterResponse::invalid_params(e.to_string())).await;
            }
        };

        if !self.authorized(request.invoke_secret()) {
            warn!("Rejected request with invalid invoke secret");
            return self.respond(LimiterResponse::unauthorized()).await;
        }

        let response = match validated {
            ValidatedRequest::Check { identifier, batch } => {
                let outcome = self.limiter.check(&identifier, &batch).await?;
                LimiterResponse::from_outcome(&outcome)
            }
            ValidatedRequest::Refill { targets } => {
                self.limiter.refill(targets.as_deref()).await?;
                LimiterResponse::refilled()
            }
        };

        info!(
            result = ?response.result,
            time_left = ?response.time_left,
            tokens_left = ?response.tokens_left,
            "Limiter decision made"
        );

        self.respond(response).await
    }

    fn authorized(&self, presented: Option<&str>) -> bool {
        match &self.invoke_secret {
            Some(expected) => presented == Some(expected.as_str()),
            None => true,
        }
    }

    async fn respond(&self, response: LimiterResponse) -> Result<LimiterResponse> {
        if let Some(hook) = &self.hook {
            let hook = hook.clone();
            let snapshot = response.clone();
            let ran = self
                .limiter
                .execution()
                .run("before response hook", async move {
                    hook.before_response(&snapshot).await
                })
                .await;
            if let Err(e) = ran {
                warn!(error = %e, "Pre-response hook failed");
            }
        }
        Ok(response)
    }
}
