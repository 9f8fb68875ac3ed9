//! Periodic schema-sync scheduler: the "periodic" half of C10's "C10
//! dispatches periodic and on-demand sync tasks -> C4 -> C5" (§4.10).
//! On-demand refreshes are handled inline by [`crate::executor`]; this
//! loop is what keeps an otherwise-idle backend's cache from going stale.

use std::time::Duration;

use querybase_error::RuntimeError;
use querybase_queue::{enqueue, EnqueueOptions, Queue};
use querybase_store::MetadataStore;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::schema_sync::SCHEMA_SYNC_KIND;

/// Owns the spawned loop that enqueues one `schema_sync` task per active
/// backend on every tick.
pub struct SchemaSyncScheduler {
    store: MetadataStore,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl SchemaSyncScheduler {
    #[must_use]
    pub fn new(store: MetadataStore, interval: Duration) -> Self {
        Self {
            store,
            interval,
            handle: None,
        }
    }

    /// Spawn the loop.
    #[must_use]
    pub fn spawn(mut self) -> Self {
        let store = self.store.clone();
        let interval = self.interval;
        self.handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(err) = tick(&store).await {
                    tracing::error!(error = %err, "schema sync scheduler tick failed");
                }
            }
        }));
        self
    }

    /// Stop the loop. Safe to call whether or not `spawn` ran.
    pub fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn tick(store: &MetadataStore) -> Result<(), RuntimeError> {
    let backends = store.list_backends().await?;
    for backend in backends.into_iter().filter(|b| b.active) {
        let payload = json!({ "backend_id": backend.id });
        enqueue(
            store,
            SCHEMA_SYNC_KIND,
            &payload,
            EnqueueOptions {
                queue: Queue::Maintenance,
                ..Default::default()
            },
        )
        .await?;
    }
    Ok(())
}
