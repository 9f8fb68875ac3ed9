use querybase_core::entities::{HeldTransaction, HeldTransactionStatus, Row as CoreRow};
use querybase_core::ids::{ApprovalId, BackendId, HeldTransactionId, PrincipalId};
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::{held_tx_status_str, HeldTransactionRow};
use crate::{map_db_err, MetadataStore};

impl MetadataStore {
    /// Persist a held-transaction record in `active` (§4.9 `start` step 5).
    ///
    /// # Errors
    ///
    /// Returns `conflict` if an active record already exists for this
    /// approval (the partial unique index enforces §3's at-most-one
    /// invariant; the broker's in-memory mutex is the primary guard, this
    /// is the persisted backstop).
    #[allow(clippy::too_many_arguments)]
    pub async fn create_held_transaction(
        &self,
        approval: ApprovalId,
        backend: BackendId,
        text: &str,
        starter: PrincipalId,
        preview_columns: &[String],
        preview_rows: &[CoreRow],
        affected_rows: Option<u64>,
    ) -> Result<HeldTransaction, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO held_transactions (id, approval_id, backend_id, text, starter_id, status, \
             preview_columns, preview_rows, affected_rows, started_at) \
             VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, now())",
        )
        .bind(id)
        .bind(approval.as_uuid())
        .bind(backend.as_uuid())
        .bind(text)
        .bind(starter.as_uuid())
        .bind(serde_json::to_value(preview_columns).unwrap_or_default())
        .bind(serde_json::to_value(preview_rows).unwrap_or_default())
        .bind(affected_rows.map(|v| v as i64))
        .execute(self.pool())
        .await
        .map_err(|err| {
            if matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation()) {
                RuntimeError::conflict("already_active")
            } else {
                map_db_err(err)
            }
        })?;

        self.get_held_transaction(HeldTransactionId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such held transaction exists.
    pub async fn get_held_transaction(&self, id: HeldTransactionId) -> Result<HeldTransaction, RuntimeError> {
        let row: HeldTransactionRow = sqlx::query_as(
            "SELECT id, approval_id, backend_id, text, starter_id, status, preview_columns, \
             preview_rows, affected_rows, error, started_at, completed_at \
             FROM held_transactions WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("held transaction {id}")))?;

        Ok(row.into())
    }

    /// Persist a held transaction that never reached `active` (§4.9 `start`
    /// step 4 failure): the backend rejected the statement before a
    /// connection could be pinned, so there is nothing to remove from the
    /// in-memory map, only a record to leave behind.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_failed_held_transaction(
        &self,
        approval: ApprovalId,
        backend: BackendId,
        text: &str,
        starter: PrincipalId,
        error: &str,
    ) -> Result<HeldTransaction, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO held_transactions (id, approval_id, backend_id, text, starter_id, status, \
             preview_columns, preview_rows, affected_rows, error, started_at, completed_at) \
             VALUES ($1, $2, $3, $4, $5, 'failed', '[]', '[]', NULL, $6, now(), now())",
        )
        .bind(id)
        .bind(approval.as_uuid())
        .bind(backend.as_uuid())
        .bind(text)
        .bind(starter.as_uuid())
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_held_transaction(HeldTransactionId::from(id)).await
    }

    /// Terminal transition (§4.9: `committed` | `rolled_back` | `failed`).
    /// Once reached the record is immutable (§3) -- this only ever moves
    /// a row out of `active`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn finalize_held_transaction(
        &self,
        id: HeldTransactionId,
        status: HeldTransactionStatus,
        error: Option<&str>,
    ) -> Result<(), RuntimeError> {
        sqlx::query(
            "UPDATE held_transactions SET status = $2, error = $3, completed_at = now() \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id.as_uuid())
        .bind(held_tx_status_str(status))
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    /// Crash recovery (§4.9): on startup, every persisted held-tx left in
    /// `active` belonged to a connection the prior process severed.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn fail_all_active_held_transactions_on_startup(&self) -> Result<u64, RuntimeError> {
        let result = sqlx::query(
            "UPDATE held_transactions SET status = 'failed', error = 'process_restart_before_commit', \
             completed_at = now() WHERE status = 'active'",
        )
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected())
    }
}
