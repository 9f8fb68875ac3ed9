use querybase_core::entities::{Membership, Principal, Role};
use querybase_core::ids::{GroupId, PrincipalId};
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::{role_str, MembershipRow, PrincipalRow};
use crate::{map_db_err, MetadataStore};

impl MetadataStore {
    /// Create a principal. `credential_hash` is opaque to this crate --
    /// hashing algorithm details are out of scope (§1).
    ///
    /// # Errors
    ///
    /// Returns `conflict` if `login` is already taken.
    pub async fn create_principal(
        &self,
        login: &str,
        credential_hash: &str,
        display_name: &str,
        role: Role,
    ) -> Result<Principal, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO principals (id, login, credential_hash, display_name, role, active) \
             VALUES ($1, $2, $3, $4, $5, TRUE)",
        )
        .bind(id)
        .bind(login)
        .bind(credential_hash)
        .bind(display_name)
        .bind(role_str(role))
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_principal(PrincipalId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such principal exists.
    pub async fn get_principal(&self, id: PrincipalId) -> Result<Principal, RuntimeError> {
        let row: PrincipalRow = sqlx::query_as(
            "SELECT id, login, credential_hash, display_name, role, active \
             FROM principals WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("principal {id}")))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_principals(&self) -> Result<Vec<Principal>, RuntimeError> {
        let rows: Vec<PrincipalRow> = sqlx::query_as(
            "SELECT id, login, credential_hash, display_name, role, active \
             FROM principals WHERE deleted_at IS NULL ORDER BY login",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft-delete a principal (§4.13).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_principal(&self, id: PrincipalId) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE principals SET deleted_at = now(), active = FALSE WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// All group memberships for `principal`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn memberships_for(&self, principal: PrincipalId) -> Result<Vec<Membership>, RuntimeError> {
        let rows: Vec<MembershipRow> =
            sqlx::query_as("SELECT principal_id, group_id FROM memberships WHERE principal_id = $1")
                .bind(principal.as_uuid())
                .fetch_all(self.pool())
                .await
                .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Add `principal` to `group`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn add_member(&self, principal: PrincipalId, group: GroupId) -> Result<(), RuntimeError> {
        sqlx::query(
            "INSERT INTO memberships (principal_id, group_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(principal.as_uuid())
        .bind(group.as_uuid())
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    /// Remove `principal` from `group`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn remove_member(&self, principal: PrincipalId, group: GroupId) -> Result<(), RuntimeError> {
        sqlx::query("DELETE FROM memberships WHERE principal_id = $1 AND group_id = $2")
            .bind(principal.as_uuid())
            .bind(group.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}
