//! Application wiring: constructs every component (§9 data-flow summary)
//! and owns their lifecycle from startup recovery through shutdown drain.

use std::sync::Arc;
use std::time::Duration;

use querybase_broker::{ApprovalCoordinator, IdleSweeper, TransactionBroker};
use querybase_core::schema::SchemaCache;
use querybase_db::PoolRegistry;
use querybase_error::{ConfigError, RuntimeError};
use querybase_events::EventBus;
use querybase_queue::{ExecutionContext, Worker};
use querybase_secrets::Vault;
use querybase_store::MetadataStore;
use querybase_webhooks::{NotificationDispatcher, NotificationTransport, WebhookTransport};

use crate::config::RuntimeConfig;
use crate::executor::QueryExecutor;
use crate::scheduler::SchemaSyncScheduler;
use crate::schema_sync::{SchemaSyncHandler, SCHEMA_SYNC_KIND};

/// Everything a caller needs to drive the running system: the query
/// executor plus handles to stop every background task in the right
/// order on shutdown.
pub struct Application {
    pub executor: QueryExecutor,
    pub approvals: ApprovalCoordinator,
    pub broker: Arc<TransactionBroker>,
    store: MetadataStore,
    pools: Arc<PoolRegistry>,
    sweeper: Option<IdleSweeper>,
    worker: Worker,
    scheduler: Option<SchemaSyncScheduler>,
    notifications: Option<NotificationDispatcher>,
    shutdown_drain: Duration,
}

impl Application {
    /// Build every component from `config` and run startup recovery
    /// (§4.9 "Crash recovery"). Does not yet start background polling;
    /// call [`Application::start`] once construction succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::VaultKeyInvalid` if the vault key cannot be
    /// resolved, or a wrapped `RuntimeError` if the metadata store is
    /// unreachable or crash recovery fails.
    pub async fn build(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        let vault_key = config.vault_key().map_err(config_error_to_runtime)?;
        let vault = Arc::new(Vault::new(&vault_key));
        let vault_key = Arc::new(vault_key);

        let store = MetadataStore::connect(&config.database_url(), config.database.max_connections).await?;
        let pools = Arc::new(PoolRegistry::new(config.backends.pool_size));
        let events = EventBus::new();
        let schema_cache = Arc::new(SchemaCache::new(Duration::from_secs(config.schema.freshness_secs)));

        let broker = Arc::new(TransactionBroker::new(
            store.clone(),
            pools.clone(),
            vault.clone(),
            events.clone(),
            Duration::from_secs(config.broker.idle_cap_secs),
        ));
        broker.recover_on_startup().await?;

        let approvals = ApprovalCoordinator::new(store.clone(), events.clone());
        let executor = QueryExecutor::new(store.clone(), pools.clone(), vault.clone(), schema_cache.clone(), events.clone());

        let worker_ctx = ExecutionContext {
            store: store.clone(),
            vault_key,
        };
        let worker = Worker::new(worker_ctx);
        worker.register(
            SCHEMA_SYNC_KIND,
            Arc::new(SchemaSyncHandler::new(pools.clone(), schema_cache, events.clone())),
        );

        let scheduler = SchemaSyncScheduler::new(store.clone(), Duration::from_secs(config.schema.freshness_secs));

        let notifications = config.webhook.url.as_ref().map(|url| {
            let transport: Arc<dyn NotificationTransport> = Arc::new(WebhookTransport::new(
                url.clone(),
                config.webhook.secret.clone(),
                Duration::from_secs(config.webhook.timeout_secs),
            ));
            NotificationDispatcher::spawn(&events, store.clone(), vec![transport])
        });

        Ok(Self {
            executor,
            approvals,
            broker,
            store,
            pools,
            sweeper: None,
            worker,
            scheduler: Some(scheduler),
            notifications,
            shutdown_drain: Duration::from_secs(config.broker.shutdown_drain_secs),
        })
    }

    /// Start every background task: the task worker's polling loops, the
    /// idle sweeper, and the periodic schema-sync scheduler.
    pub fn start(&mut self) {
        self.worker.start();
        self.sweeper = Some(IdleSweeper::spawn(self.broker.clone()));
        if let Some(scheduler) = self.scheduler.take() {
            self.scheduler = Some(scheduler.spawn());
        }
    }

    /// Orderly shutdown (§4.9, §7): stop background loops, drain held
    /// transactions, then close the metadata store and every backend
    /// pool.
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(notifications) = self.notifications.take() {
            notifications.abort();
        }
        self.worker.shutdown();
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }

        let drained = self.broker.shutdown_drain(self.shutdown_drain).await;
        tracing::info!(drained, "shutdown drain complete");

        self.store.close().await;
        self.pools.shutdown().await;
    }
}

fn config_error_to_runtime(err: ConfigError) -> RuntimeError {
    RuntimeError::internal(err.to_string())
}
