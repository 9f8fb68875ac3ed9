use querybase_core::entities::{Backend, BackendKind, Grant};
use querybase_core::ids::{BackendId, GroupId};
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::{backend_kind_str, BackendRow};
use crate::{map_db_err, MetadataStore};

impl MetadataStore {
    /// `encrypted_credential` must already be the base64 AEAD blob from
    /// `querybase-secrets`; this crate never sees plaintext (§4.1).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_backend(
        &self,
        name: &str,
        kind: BackendKind,
        host: &str,
        port: u16,
        database: &str,
        user: &str,
        encrypted_credential: &str,
    ) -> Result<Backend, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO backends (id, name, kind, host, port, database, \"user\", encrypted_credential, active, healthy) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, TRUE)",
        )
        .bind(id)
        .bind(name)
        .bind(backend_kind_str(kind))
        .bind(host)
        .bind(i32::from(port))
        .bind(database)
        .bind(user)
        .bind(encrypted_credential)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_backend(BackendId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such backend exists.
    pub async fn get_backend(&self, id: BackendId) -> Result<Backend, RuntimeError> {
        let row: BackendRow = sqlx::query_as(
            "SELECT id, name, kind, host, port, database, \"user\", encrypted_credential, \
             active, healthy, last_schema_sync_at, last_health_check_at, deleted_at \
             FROM backends WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("backend {id}")))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_backends(&self) -> Result<Vec<Backend>, RuntimeError> {
        let rows: Vec<BackendRow> = sqlx::query_as(
            "SELECT id, name, kind, host, port, database, \"user\", encrypted_credential, \
             active, healthy, last_schema_sync_at, last_health_check_at, deleted_at \
             FROM backends WHERE deleted_at IS NULL ORDER BY name",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft-delete; callers are responsible for tearing down the
    /// connection pool via `querybase-db`'s `PoolRegistry::remove` (§4.2).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_backend(&self, id: BackendId) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE backends SET deleted_at = now(), active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Record the outcome of a schema sync (§4.5).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn mark_schema_synced(&self, id: BackendId, healthy: bool) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE backends SET last_schema_sync_at = now(), healthy = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(healthy)
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Record a health check result (§6 `Backend.health`).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn mark_health_checked(&self, id: BackendId, healthy: bool) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE backends SET last_health_check_at = now(), healthy = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(healthy)
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Replace the grant row for `(backend, group)` (§6 `Backend.set_grants`).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn set_grant(&self, backend: BackendId, group: GroupId, read: bool, write: bool, approve: bool) -> Result<(), RuntimeError> {
        sqlx::query(
            "INSERT INTO grants (backend_id, group_id, read, write, approve) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (backend_id, group_id) DO UPDATE SET read = $3, write = $4, approve = $5",
        )
        .bind(backend.as_uuid())
        .bind(group.as_uuid())
        .bind(read)
        .bind(write)
        .bind(approve)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    /// Every grant for `backend`, used by the permission evaluator (C6).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn grants_for_backend(&self, backend: BackendId) -> Result<Vec<Grant>, RuntimeError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            backend_id: Uuid,
            group_id: Uuid,
            read: bool,
            write: bool,
            approve: bool,
        }

        let rows: Vec<Row> = sqlx::query_as(
            "SELECT backend_id, group_id, read, write, approve FROM grants WHERE backend_id = $1",
        )
        .bind(backend.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows
            .into_iter()
            .map(|r| Grant {
                backend: BackendId::from(r.backend_id),
                group: GroupId::from(r.group_id),
                read: r.read,
                write: r.write,
                approve: r.approve,
            })
            .collect())
    }
}
