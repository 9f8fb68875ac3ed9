//! Schema sync task handler (§4.5, §4.10): the task queue's bridge from
//! C10 back into C4 (introspection) and C5 (cache publish). Both the
//! periodic scheduler in [`crate::app`] and on-demand refresh requests
//! enqueue this kind.

use std::sync::Arc;

use async_trait::async_trait;
use querybase_core::ids::BackendId;
use querybase_core::schema::SchemaCache;
use querybase_db::{DbSchemaInspector, PoolRegistry};
use querybase_events::{EventBus, EventPayload};
use querybase_queue::{ExecutionContext, TaskHandler};
use querybase_secrets::Vault;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Task kind registered with the worker for this handler.
pub const SCHEMA_SYNC_KIND: &str = "schema_sync";

#[derive(Deserialize)]
struct SchemaSyncPayload {
    backend_id: BackendId,
}

/// Refreshes one backend's cached schema snapshot and records the sync.
pub struct SchemaSyncHandler {
    pools: Arc<PoolRegistry>,
    cache: Arc<SchemaCache>,
    events: EventBus,
}

impl SchemaSyncHandler {
    #[must_use]
    pub fn new(pools: Arc<PoolRegistry>, cache: Arc<SchemaCache>, events: EventBus) -> Self {
        Self { pools, cache, events }
    }
}

#[async_trait]
impl TaskHandler for SchemaSyncHandler {
    async fn handle(&self, ctx: &ExecutionContext, payload: &JsonValue) -> Result<(), String> {
        let payload: SchemaSyncPayload = serde_json::from_value(payload.clone()).map_err(|e| e.to_string())?;

        let backend = ctx
            .store
            .get_backend(payload.backend_id)
            .await
            .map_err(|e| e.to_string())?;

        let vault = Vault::new(&ctx.vault_key);
        let inspector = DbSchemaInspector::new(self.pools.clone(), Arc::new(vault));

        let result = self.cache.get_or_refresh(&backend, &inspector, true).await;
        let healthy = result.is_ok();
        ctx.store
            .mark_schema_synced(backend.id, healthy)
            .await
            .map_err(|e| e.to_string())?;

        // §4.5: a successful refresh publishes the fresh snapshot; a
        // failed one republishes whatever stale snapshot is still
        // cached so subscribers can at least observe the health flip.
        match &result {
            Ok(snapshot) => self.events.publish(EventPayload::SchemaUpdated {
                backend_id: backend.id,
                snapshot: Box::new(snapshot.clone()),
            }),
            Err(_) => {
                if let Some(stale) = self.cache.peek(backend.id) {
                    self.events.publish(EventPayload::SchemaUpdated {
                        backend_id: backend.id,
                        snapshot: Box::new(stale),
                    });
                }
            }
        }

        result.map(|_| ()).map_err(|e| e.to_string())
    }
}
