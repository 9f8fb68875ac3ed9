//! Handler registration and execution context (§4.10 "handlers receive
//! an execution context carrying the metadata store handle and the
//! vault key so they can reuse C1-C9").

use std::sync::Arc;

use async_trait::async_trait;
use querybase_secrets::VaultKey;
use querybase_store::MetadataStore;
use serde_json::Value as JsonValue;

/// Shared state every handler gets, cheap to clone.
#[derive(Clone)]
pub struct ExecutionContext {
    pub store: MetadataStore,
    pub vault_key: Arc<VaultKey>,
}

/// A handler registered for one task `kind`. An error triggers a retry
/// up to the task's `max_retries`; the message is stored as `last_error`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &ExecutionContext, payload: &JsonValue) -> Result<(), String>;
}

/// Adapts a plain async closure into a [`TaskHandler`], for tests and
/// simple periodic jobs that don't warrant a named type.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(ExecutionContext, JsonValue) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), String>> + Send,
{
    async fn handle(&self, ctx: &ExecutionContext, payload: &JsonValue) -> Result<(), String> {
        (self.0)(ctx.clone(), payload.clone()).await
    }
}
