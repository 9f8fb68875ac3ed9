use querybase_error::RuntimeError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{map_db_err, MetadataStore};

/// A persisted notification record (§6 "notification records").
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub delivered: bool,
    pub attempts: i32,
}

impl MetadataStore {
    /// Record a notification event at emission time, before any delivery
    /// attempt (§9 "the core never blocks on transport latency").
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn create_notification(
        &self,
        event_type: &str,
        payload: &impl Serialize,
    ) -> Result<NotificationRecord, RuntimeError> {
        let id = Uuid::new_v4();
        let payload = serde_json::to_value(payload).unwrap_or(JsonValue::Null);
        sqlx::query(
            "INSERT INTO notifications (id, event_type, payload, delivered, attempts, created_at) \
             VALUES ($1, $2, $3, false, 0, now())",
        )
        .bind(id)
        .bind(event_type)
        .bind(&payload)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;

        Ok(NotificationRecord {
            id,
            event_type: event_type.to_string(),
            payload,
            delivered: false,
            attempts: 0,
        })
    }

    /// Record one delivery attempt. `delivered` is set once a transport
    /// reports success; repeated calls before success just bump `attempts`.
    ///
    /// # Errors
    ///
    /// Returns `internal` on a database failure.
    pub async fn record_notification_attempt(&self, id: Uuid, delivered: bool) -> Result<(), RuntimeError> {
        sqlx::query(
            "UPDATE notifications SET attempts = attempts + 1, delivered = delivered OR $2 WHERE id = $1",
        )
        .bind(id)
        .bind(delivered)
        .execute(self.pool())
        .await
        .map_err(map_db_err)?;
        Ok(())
    }
}
