//! Schema inspector contract (C4) and in-memory schema cache (C5, §4.4,
//! §4.5). Actual introspection against PostgreSQL/MySQL lives in
//! `querybase-db`, which implements [`SchemaInspector`] for its
//! connection handles; this crate only owns the snapshot shape and the
//! caching/freshness/collapsing policy around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use querybase_error::RuntimeError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::entities::{Backend, BackendKind};
use crate::ids::BackendId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_name: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub foreign_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Option<Vec<String>>,
}

/// `{backend_kind, database, tables[...]}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub backend_kind: BackendKind,
    pub database: String,
    pub tables: Vec<TableSchema>,
    pub synced_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Deterministic ordering per §4.4: tables by `(schema, name)`, columns
    /// by ordinal position (callers are expected to have already produced
    /// columns in ordinal order from the information-schema query; this
    /// only orders the table list).
    pub fn sort_tables(&mut self) {
        self.tables
            .sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
    }

    #[must_use]
    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| {
            t.name.eq_ignore_ascii_case(name) || format!("{}.{}", t.schema, t.name).eq_ignore_ascii_case(name)
        })
    }
}

/// Introspection contract (C4). Implemented per backend kind by
/// `querybase-db` against a live connection handle.
#[async_trait]
pub trait SchemaInspector: Send + Sync {
    async fn introspect(&self, backend: &Backend) -> Result<SchemaSnapshot, RuntimeError>;
}

/// Default freshness window (§4.5): `T_fresh = 5 min`.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    snapshot: SchemaSnapshot,
    synced_at: DateTime<Utc>,
}

/// Per-backend schema cache with freshness-gated reads and collapsed
/// concurrent refreshes (§4.5). Readers never block writers: the
/// snapshot is published atomically by replacing the map entry.
pub struct SchemaCache {
    entries: DashMap<BackendId, CacheEntry>,
    refresh_locks: DashMap<BackendId, Arc<AsyncMutex<()>>>,
    freshness: Duration,
}

impl SchemaCache {
    #[must_use]
    pub fn new(freshness: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            freshness,
        }
    }

    fn refresh_lock(&self, backend_id: BackendId) -> Arc<AsyncMutex<()>> {
        self.refresh_locks
            .entry(backend_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    #[must_use]
    pub fn peek(&self, backend_id: BackendId) -> Option<SchemaSnapshot> {
        self.entries.get(&backend_id).map(|e| e.snapshot.clone())
    }

    fn is_fresh(&self, backend_id: BackendId) -> bool {
        self.entries
            .get(&backend_id)
            .is_some_and(|e| Utc::now().signed_duration_since(e.synced_at).to_std().unwrap_or(Duration::MAX) < self.freshness)
    }

    /// Return the cached snapshot if fresh; otherwise synchronously
    /// refresh via `inspector` (§4.5). Concurrent callers for the same
    /// backend collapse onto a single in-flight refresh -- latecomers
    /// await the lock and then observe the snapshot the winner published.
    pub async fn get_or_refresh(
        &self,
        backend: &Backend,
        inspector: &dyn SchemaInspector,
        force: bool,
    ) -> Result<SchemaSnapshot, RuntimeError> {
        if !force && self.is_fresh(backend.id) {
            if let Some(snapshot) = self.peek(backend.id) {
                return Ok(snapshot);
            }
        }

        let lock = self.refresh_lock(backend.id);
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: another task may have just
        // completed the refresh we were about to duplicate.
        if !force && self.is_fresh(backend.id) {
            if let Some(snapshot) = self.peek(backend.id) {
                return Ok(snapshot);
            }
        }

        let mut snapshot = inspector.introspect(backend).await?;
        snapshot.sort_tables();
        let synced_at = Utc::now();
        self.entries.insert(
            backend.id,
            CacheEntry {
                snapshot: snapshot.clone(),
                synced_at,
            },
        );
        Ok(snapshot)
    }

    /// Publish a snapshot obtained out-of-band (e.g. by the task queue's
    /// periodic sync worker) without going through an inspector call.
    pub fn publish(&self, backend_id: BackendId, mut snapshot: SchemaSnapshot) {
        snapshot.sort_tables();
        self.entries.insert(
            backend_id,
            CacheEntry {
                snapshot,
                synced_at: Utc::now(),
            },
        );
    }

    pub fn last_synced_at(&self, backend_id: BackendId) -> Option<DateTime<Utc>> {
        self.entries.get(&backend_id).map(|e| e.synced_at)
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn backend() -> Backend {
        Backend {
            id: BackendId::new(),
            name: "b1".into(),
            kind: BackendKind::Pg,
            host: "localhost".into(),
            port: 5432,
            database: "app".into(),
            user: "app".into(),
            encrypted_credential: String::new(),
            active: true,
            healthy: true,
            last_schema_sync_at: None,
            last_health_check_at: None,
            deleted_at: None,
        }
    }

    struct CountingInspector {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaInspector for CountingInspector {
        async fn introspect(&self, backend: &Backend) -> Result<SchemaSnapshot, RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SchemaSnapshot {
                backend_kind: backend.kind,
                database: backend.database.clone(),
                tables: vec![],
                synced_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn fresh_read_does_not_refresh() {
        let cache = SchemaCache::new(Duration::from_secs(300));
        let backend = backend();
        let inspector = CountingInspector {
            calls: AtomicUsize::new(0),
        };

        cache.get_or_refresh(&backend, &inspector, false).await.unwrap();
        cache.get_or_refresh(&backend, &inspector, false).await.unwrap();

        assert_eq!(inspector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forced_refresh_always_calls_inspector() {
        let cache = SchemaCache::new(Duration::from_secs(300));
        let backend = backend();
        let inspector = CountingInspector {
            calls: AtomicUsize::new(0),
        };

        cache.get_or_refresh(&backend, &inspector, true).await.unwrap();
        cache.get_or_refresh(&backend, &inspector, true).await.unwrap();

        assert_eq!(inspector.calls.load(Ordering::SeqCst), 2);
    }
}
