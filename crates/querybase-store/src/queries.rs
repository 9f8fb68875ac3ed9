use querybase_core::entities::{HistoryEntry, QueryRecord, QueryStatus, Row as CoreRow, StatementKind};
use querybase_core::ids::{BackendId, PrincipalId, QueryId};
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::{kind_str, query_status_str, HistoryRow, QueryRow, ResultRow};
use crate::{map_db_err, MetadataStore};

impl MetadataStore {
    /// Persist a new query row in `running` (§4.7 step 4: "persist a
    /// Query row in running before executing").
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn create_query(
        &self,
        backend: BackendId,
        principal: PrincipalId,
        text: &str,
        kind: StatementKind,
        name: Option<&str>,
        description: Option<&str>,
        requires_approval: bool,
        status: QueryStatus,
    ) -> Result<QueryRecord, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO queries (id, backend_id, principal_id, text, kind, name, description, \
             status, requires_approval, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())",
        )
        .bind(id)
        .bind(backend.as_uuid())
        .bind(principal.as_uuid())
        .bind(text)
        .bind(kind_str(kind))
        .bind(name)
        .bind(description)
        .bind(query_status_str(status))
        .bind(requires_approval)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_query(QueryId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such query exists.
    pub async fn get_query(&self, id: QueryId) -> Result<QueryRecord, RuntimeError> {
        let row: QueryRow = sqlx::query_as(
            "SELECT id, backend_id, principal_id, text, kind, name, description, status, \
             row_count, duration_ms, error, requires_approval, created_at \
             FROM queries WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("query {id}")))?;

        Ok(row.into())
    }

    /// Transition a query to `completed` and persist its result (§4.7
    /// step 4). Done inside one transaction for referential consistency.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn complete_query(
        &self,
        id: QueryId,
        columns: &[String],
        column_types: &[String],
        rows: &[CoreRow],
        duration_ms: u64,
    ) -> Result<(), RuntimeError> {
        let mut tx = self.pool().begin().await.map_err(map_db_err)?;
        let row_count = rows.len() as i64;
        let size_bytes = serde_json::to_vec(rows).map(|v| v.len()).unwrap_or(0) as i64;

        sqlx::query(
            "INSERT INTO results (query_id, columns, column_types, rows, row_count, stored_at, size_bytes) \
             VALUES ($1, $2, $3, $4, $5, now(), $6)",
        )
        .bind(id.as_uuid())
        .bind(serde_json::to_value(columns).unwrap_or_default())
        .bind(serde_json::to_value(column_types).unwrap_or_default())
        .bind(serde_json::to_value(rows).unwrap_or_default())
        .bind(row_count)
        .bind(size_bytes)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sqlx::query(
            "UPDATE queries SET status = 'completed', row_count = $2, duration_ms = $3 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(row_count)
        .bind(duration_ms as i64)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    /// Transition a query to `failed` (§4.7 step 5).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn fail_query(&self, id: QueryId, error: &str, duration_ms: u64) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE queries SET status = 'failed', error = $2, duration_ms = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(error)
            .bind(duration_ms as i64)
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `not_found` if no result has been stored for `query_id`.
    pub async fn get_result(&self, query_id: QueryId) -> Result<querybase_core::entities::ResultRecord, RuntimeError> {
        let row: ResultRow = sqlx::query_as(
            "SELECT query_id, columns, column_types, rows, row_count, stored_at, size_bytes \
             FROM results WHERE query_id = $1",
        )
        .bind(query_id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("result for query {query_id}")))?;

        Ok(row.into())
    }

    /// Soft-delete a query (§4.13); its history entries survive (§3).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_query(&self, id: QueryId) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE queries SET deleted_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Append an immutable history entry (C12, §4.12).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_history(
        &self,
        query: Option<QueryId>,
        principal: PrincipalId,
        backend: BackendId,
        text: &str,
        kind: StatementKind,
        status: QueryStatus,
        row_count: Option<u64>,
        duration_ms: Option<u64>,
        error: Option<&str>,
    ) -> Result<HistoryEntry, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO history (id, query_id, principal_id, backend_id, text, kind, status, \
             row_count, duration_ms, error, executed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())",
        )
        .bind(id)
        .bind(query.map(|q| q.as_uuid()))
        .bind(principal.as_uuid())
        .bind(backend.as_uuid())
        .bind(text)
        .bind(kind_str(kind))
        .bind(query_status_str(status))
        .bind(row_count.map(|v| v as i64))
        .bind(duration_ms.map(|v| v as i64))
        .bind(error)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        let row: HistoryRow = sqlx::query_as(
            "SELECT id, query_id, principal_id, backend_id, text, kind, status, row_count, \
             duration_ms, error, executed_at FROM history WHERE id = $1",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(row.into())
    }

    /// History for one principal, newest first (§4.12 index).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn history_for_principal(&self, principal: PrincipalId, limit: i64) -> Result<Vec<HistoryEntry>, RuntimeError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, query_id, principal_id, backend_id, text, kind, status, row_count, \
             duration_ms, error, executed_at FROM history \
             WHERE principal_id = $1 ORDER BY executed_at DESC LIMIT $2",
        )
        .bind(principal.as_uuid())
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// History for one backend, newest first (§4.12 index).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn history_for_backend(&self, backend: BackendId, limit: i64) -> Result<Vec<HistoryEntry>, RuntimeError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, query_id, principal_id, backend_id, text, kind, status, row_count, \
             duration_ms, error, executed_at FROM history \
             WHERE backend_id = $1 ORDER BY executed_at DESC LIMIT $2",
        )
        .bind(backend.as_uuid())
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
