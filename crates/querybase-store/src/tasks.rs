use chrono::{DateTime, Utc};
use querybase_error::RuntimeError;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{map_db_err, MetadataStore};

/// A queued task (C10, §4.10). Mirrors the `tasks` table row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub kind: String,
    pub queue: String,
    pub payload: JsonValue,
    pub priority: i32,
    pub state: String,
    pub attempt: i32,
    pub max_retries: i32,
    pub timeout_secs: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl MetadataStore {
    /// Persist a new task in `pending` (§4.10 `enqueue`).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue_task(
        &self,
        kind: &str,
        queue: &str,
        payload: &JsonValue,
        priority: i32,
        max_retries: i32,
        timeout_secs: i32,
    ) -> Result<TaskRow, RuntimeError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tasks (id, kind, queue, payload, priority, state, attempt, \
             max_retries, timeout_secs, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7, now())",
        )
        .bind(id)
        .bind(kind)
        .bind(queue)
        .bind(payload)
        .bind(priority)
        .bind(max_retries)
        .bind(timeout_secs)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        self.get_task(id).await
    }

    /// # Errors
    ///
    /// Returns `not_found` if no such task exists.
    pub async fn get_task(&self, id: Uuid) -> Result<TaskRow, RuntimeError> {
        sqlx::query_as(
            "SELECT id, kind, queue, payload, priority, state, attempt, max_retries, \
             timeout_secs, last_error, created_at, retry_at, completed_at FROM tasks WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| RuntimeError::not_found(format!("task {id}")))
    }

    /// Atomically claim the highest-priority, oldest ready task on
    /// `queue` for execution. Uses `FOR UPDATE SKIP LOCKED` so concurrent
    /// workers never claim the same row (§4.10, §5 concurrency model).
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn claim_next_task(&self, queue: &str) -> Result<Option<TaskRow>, RuntimeError> {
        let mut tx = self.pool().begin().await.map_err(map_db_err)?;

        let candidate: Option<TaskRow> = sqlx::query_as(
            "SELECT id, kind, queue, payload, priority, state, attempt, max_retries, \
             timeout_secs, last_error, created_at, retry_at, completed_at FROM tasks \
             WHERE queue = $1 AND state = 'pending' AND (retry_at IS NULL OR retry_at <= now()) \
             ORDER BY priority DESC, created_at ASC \
             FOR UPDATE SKIP LOCKED LIMIT 1",
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let Some(task) = candidate else {
            tx.commit().await.map_err(map_db_err)?;
            return Ok(None);
        };

        sqlx::query("UPDATE tasks SET state = 'running', attempt = attempt + 1 WHERE id = $1")
            .bind(task.id)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;
        self.get_task(task.id).await.map(Some)
    }

    /// Mark a running task `completed`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn complete_task(&self, id: Uuid) -> Result<(), RuntimeError> {
        sqlx::query("UPDATE tasks SET state = 'completed', completed_at = now() WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    /// Record a failed attempt. Returns the task to `pending` with a
    /// `retry_at` delay while attempts remain, otherwise terminates it as
    /// `failed` (§4.10 "terminal failures are logged and dropped").
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn fail_task(&self, id: Uuid, error: &str, retry_at: Option<DateTime<Utc>>) -> Result<(), RuntimeError> {
        let state = if retry_at.is_some() { "pending" } else { "failed" };
        let completed_at = retry_at.is_none().then(Utc::now);
        sqlx::query(
            "UPDATE tasks SET state = $2, last_error = $3, retry_at = $4, completed_at = $5 WHERE id = $1",
        )
        .bind(id)
        .bind(state)
        .bind(error)
        .bind(retry_at)
        .bind(completed_at)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(())
    }
}
