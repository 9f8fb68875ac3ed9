//! The uniform connection handle (C2, §4.2): `ping`, `execute_read`,
//! `execute_write`, and `begin` for a live-held transaction. Built on
//! `sqlx`'s `Any` driver so the same code path serves both PostgreSQL and
//! MySQL backends.

use std::time::Duration;

use querybase_core::entities::Row;
use querybase_error::{BackendError, RuntimeError};
use sqlx::any::AnyPool;
use sqlx::{Executor, Row as _};

use crate::row::{column_names, column_types, decode_row};

/// Default per-handle statement timeout (§4.2): five minutes.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Result of a read: streamed rows collected into memory plus column
/// metadata (§4.2, §9).
#[derive(Debug, Clone)]
pub struct ExecuteOutcome {
    pub columns: Vec<String>,
    pub column_types: Vec<String>,
    pub rows: Vec<Row>,
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, RuntimeError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(BackendError::ExecutionFailed {
            message: BackendError::truncated_message(&err.to_string()),
        }
        .into()),
        Err(_) => Err(BackendError::StatementTimeout {
            timeout_secs: timeout.as_secs(),
        }
        .into()),
    }
}

/// A pooled connection to one backend, shared by all concurrent requests
/// against that backend.
pub struct BackendConnection {
    pool: AnyPool,
    statement_timeout: Duration,
}

impl BackendConnection {
    #[must_use]
    pub fn new(pool: AnyPool, statement_timeout: Duration) -> Self {
        Self {
            pool,
            statement_timeout,
        }
    }

    /// Health check (§6 `Backend.health`).
    ///
    /// # Errors
    ///
    /// Returns `backend_error` if the connection check fails or times out.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        with_timeout(self.statement_timeout, self.pool.execute(sqlx::query("SELECT 1")))
            .await
            .map(|_| ())
    }

    /// Execute a read statement and collect the full result set in
    /// memory (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `backend_error` on query failure, or a timeout error if the
    /// statement runs past the handle's configured timeout.
    pub async fn execute_read(&self, stmt: &str) -> Result<ExecuteOutcome, RuntimeError> {
        let rows = with_timeout(self.statement_timeout, sqlx::query(stmt).fetch_all(&self.pool)).await?;
        Ok(build_outcome(&rows))
    }

    /// Execute a mutating statement, returning the affected row count.
    ///
    /// # Errors
    ///
    /// Returns `backend_error` on execution failure or timeout.
    pub async fn execute_write(&self, stmt: &str) -> Result<u64, RuntimeError> {
        let result = with_timeout(self.statement_timeout, sqlx::query(stmt).execute(&self.pool)).await?;
        Ok(result.rows_affected())
    }

    /// Open a held transaction: the returned connection is pinned to the
    /// caller until committed or rolled back (§4.9).
    ///
    /// # Errors
    ///
    /// Returns `backend_error` if the backend refuses to begin a
    /// transaction (e.g. connection exhaustion).
    pub async fn begin(&self) -> Result<HeldConnection, RuntimeError> {
        let tx = self.pool.begin().await.map_err(|err| BackendError::ConnectionFailed {
            backend_id: String::new(),
            message: BackendError::truncated_message(&err.to_string()),
        })?;
        Ok(HeldConnection {
            tx: Some(tx),
            statement_timeout: self.statement_timeout,
        })
    }
}

fn build_outcome(rows: &[sqlx::any::AnyRow]) -> ExecuteOutcome {
    let Some(first) = rows.first() else {
        return ExecuteOutcome {
            columns: Vec::new(),
            column_types: Vec::new(),
            rows: Vec::new(),
        };
    };
    ExecuteOutcome {
        columns: column_names(first),
        column_types: column_types(first),
        rows: rows.iter().map(decode_row).collect(),
    }
}

/// A backend transaction opened for preview (C9's pinned resource). Owns
/// an `sqlx::Transaction` with a `'static` lifetime, meaning it holds its
/// pooled connection independent of any borrow -- exactly the "pinned
/// connection" semantics the transaction broker requires.
pub struct HeldConnection {
    tx: Option<sqlx::Transaction<'static, sqlx::Any>>,
    statement_timeout: Duration,
}

impl HeldConnection {
    fn tx_mut(&mut self) -> Result<&mut sqlx::Transaction<'static, sqlx::Any>, RuntimeError> {
        self.tx
            .as_mut()
            .ok_or_else(|| RuntimeError::internal("held transaction already finalized"))
    }

    /// Execute a read inside the held transaction.
    ///
    /// # Errors
    ///
    /// Returns `backend_error` on query failure or timeout.
    pub async fn execute_read(&mut self, stmt: &str) -> Result<ExecuteOutcome, RuntimeError> {
        let timeout = self.statement_timeout;
        let tx = self.tx_mut()?;
        let rows = with_timeout(timeout, sqlx::query(stmt).fetch_all(&mut **tx)).await?;
        Ok(build_outcome(&rows))
    }

    /// Execute a mutating statement inside the held transaction, returning
    /// the affected row count.
    ///
    /// # Errors
    ///
    /// Returns `backend_error` on execution failure or timeout.
    pub async fn execute_write(&mut self, stmt: &str) -> Result<u64, RuntimeError> {
        let timeout = self.statement_timeout;
        let tx = self.tx_mut()?;
        let result = with_timeout(timeout, sqlx::query(stmt).execute(&mut **tx)).await?;
        Ok(result.rows_affected())
    }

    /// Commit and release the pinned connection back to its pool.
    ///
    /// # Errors
    ///
    /// Returns `backend_error` if the backend rejects the commit.
    pub async fn commit(mut self) -> Result<(), RuntimeError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| RuntimeError::internal("held transaction already finalized"))?;
        tx.commit().await.map_err(|err| {
            RuntimeError::from(BackendError::ExecutionFailed {
                message: BackendError::truncated_message(&err.to_string()),
            })
        })
    }

    /// Roll back and release the pinned connection back to its pool.
    ///
    /// # Errors
    ///
    /// Returns `backend_error` if the backend rejects the rollback.
    pub async fn rollback(mut self) -> Result<(), RuntimeError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        tx.rollback().await.map_err(|err| {
            RuntimeError::from(BackendError::ExecutionFailed {
                message: BackendError::truncated_message(&err.to_string()),
            })
        })
    }
}

impl Drop for HeldConnection {
    fn drop(&mut self) {
        if self.tx.is_some() {
            // Dropped without an explicit commit/rollback (e.g. a handler
            // panic unwound past it): sqlx rolls the transaction back and
            // releases the pooled connection when the guard is dropped, so
            // the connection is never leaked even on this path (§4.9
            // "no connection leak").
            tracing::warn!("held connection dropped without explicit commit or rollback");
        }
    }
}
