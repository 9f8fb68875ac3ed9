//! Metadata store (C13, §4.13): the canonical persistent store for
//! principals, groups, grants, queries, results, history, approvals,
//! reviews, comments, and held transactions. No caller outside this
//! crate constructs raw SQL against the metadata database; every entity
//! gets a typed accessor.

mod approvals;
mod backends;
mod groups;
mod held_tx;
mod notifications;
mod principals;
mod queries;
mod rows;
mod tasks;

pub use approvals::{ApprovalCounts, ApprovalFilter};
pub use notifications::NotificationRecord;
pub use tasks::TaskRow;

use querybase_error::{RuntimeError, StoreError};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle to the metadata database. Cheap to clone (wraps a connection
/// pool); background task-queue handlers receive a clone through their
/// execution context (§4.10, §9).
#[derive(Clone)]
pub struct MetadataStore {
    pool: PgPool,
}

impl MetadataStore {
    /// Connect and run pending migrations. Metadata store unreachability
    /// at startup is fatal (§7).
    ///
    /// # Errors
    ///
    /// Returns `internal` wrapping the connection or migration failure.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, RuntimeError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| RuntimeError::internal(format!("metadata store unreachable: {err}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| RuntimeError::internal(format!("migration failed: {err}")))?;

        Ok(Self { pool })
    }

    /// Build a store handle over an already-open pool (used by tests and
    /// by callers that manage the pool's lifecycle themselves).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the underlying pool. Called on orderly shutdown after the
    /// transaction broker has drained its held transactions (§4.9).
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn map_db_err(err: sqlx::Error) -> RuntimeError {
    StoreError::from(err).into()
}

