use querybase_core::entities::Group;
use querybase_core::ids::GroupId;
use querybase_error::RuntimeError;
use uuid::Uuid;

use crate::rows::GroupRow;
use crate::{map_db_err, MetadataStore};

impl MetadataStore {
    /// # Errors
    ///
    /// Returns `conflict` if `name` is already taken.
    pub async fn create_group(&self, name: &str, description: Option<&str>) -> Result<Group, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, description) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(name)
            .bind(description)
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;

        self.get_group(GroupId::from(id)).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such group exists.
    pub async fn get_group(&self, id: GroupId) -> Result<Group, RuntimeError> {
        let row: GroupRow = sqlx::query_as(
            "SELECT id, name, description, deleted_at FROM groups WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("group {id}")))?;

        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn list_groups(&self) -> Result<Vec<Group>, RuntimeError> {
        let rows: Vec<GroupRow> =
            sqlx::query_as("SELECT id, name, description, deleted_at FROM groups WHERE deleted_at IS NULL ORDER BY name")
                .fetch_all(self.pool())
                .await
                .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Soft-delete (§4.13).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn delete_group(&self, id: GroupId) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE groups SET deleted_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }
}
