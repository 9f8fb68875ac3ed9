//! Consumer side: polls the named queues and dispatches to registered
//! handlers (§4.10).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use querybase_store::MetadataStore;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;

use crate::backoff::next_retry_at;
use crate::handler::{ExecutionContext, TaskHandler};
use crate::queue::{EnqueueOptions, Queue};

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const ALL_QUEUES: [Queue; 3] = [Queue::Default, Queue::Maintenance, Queue::Notifications];

/// Enqueue a task (§4.10 `enqueue`). Thin wrapper over the store so
/// callers outside this crate don't need to know the persisted shape.
///
/// # Errors
///
/// Returns `internal` on a database failure.
pub async fn enqueue(
    store: &MetadataStore,
    kind: &str,
    payload: &JsonValue,
    opts: EnqueueOptions,
) -> Result<(), querybase_error::RuntimeError> {
    store
        .enqueue_task(
            kind,
            opts.queue.as_str(),
            payload,
            opts.priority,
            i32::try_from(opts.max_retries).unwrap_or(i32::MAX),
            i32::try_from(opts.timeout.as_secs()).unwrap_or(i32::MAX),
        )
        .await
        .map(|_| ())
}

/// Owns the handler registry and the background polling task per queue.
pub struct Worker {
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
    ctx: ExecutionContext,
    tasks: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Build a worker with no handlers registered and no polling loops
    /// started; call [`Worker::register`] then [`Worker::start`].
    #[must_use]
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            ctx,
            tasks: Vec::new(),
        }
    }

    /// Register a handler for a task `kind`. Re-registering the same
    /// kind replaces the previous handler.
    pub fn register(&self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Start one polling loop per named queue. Returned handles are kept
    /// so `shutdown` can abort them; dropping the `Worker` leaks the
    /// tasks (callers should call `shutdown` explicitly).
    pub fn start(&mut self) {
        for queue in ALL_QUEUES {
            let store = self.ctx.store.clone();
            let ctx = self.ctx.clone();
            let handlers = self.handlers.clone();
            self.tasks.push(tokio::spawn(poll_loop(store, ctx, handlers, queue)));
        }
    }

    /// Abort every polling loop. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

async fn poll_loop(
    store: MetadataStore,
    ctx: ExecutionContext,
    handlers: Arc<DashMap<String, Arc<dyn TaskHandler>>>,
    queue: Queue,
) {
    loop {
        match store.claim_next_task(queue.as_str()).await {
            Ok(Some(task)) => {
                let handler = handlers.get(&task.kind).map(|h| h.clone());
                let Some(handler) = handler else {
                    tracing::warn!(kind = %task.kind, "no handler registered for task kind; dropping");
                    let _ = store
                        .fail_task(task.id, "no handler registered for kind", None)
                        .await;
                    continue;
                };

                let timeout = Duration::from_secs(u64::try_from(task.timeout_secs).unwrap_or(30));
                let outcome = tokio::time::timeout(timeout, handler.handle(&ctx, &task.payload)).await;

                match outcome {
                    Ok(Ok(())) => {
                        if let Err(err) = store.complete_task(task.id).await {
                            tracing::error!(error = %err, "failed to record task completion");
                        }
                    }
                    Ok(Err(message)) => {
                        record_failure(&store, task.id, task.attempt, task.max_retries, &message).await;
                    }
                    Err(_) => {
                        record_failure(&store, task.id, task.attempt, task.max_retries, "handler timed out").await;
                    }
                }
            }
            Ok(None) => tokio::time::sleep(POLL_INTERVAL).await,
            Err(err) => {
                tracing::error!(error = %err, queue = queue.as_str(), "failed to claim task");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

async fn record_failure(store: &MetadataStore, id: uuid::Uuid, attempt: i32, max_retries: i32, message: &str) {
    let retry_at = (attempt < max_retries).then(|| next_retry_at(u32::try_from(attempt).unwrap_or(u32::MAX)));
    tracing::warn!(attempt, max_retries, error = message, "task attempt failed");
    if let Err(err) = store.fail_task(id, message, retry_at).await {
        tracing::error!(error = %err, "failed to record task failure");
    }
}
