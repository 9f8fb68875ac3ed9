//! Bridges the event bus to notification transports (§4.11, §9).

use std::sync::Arc;
use std::time::Duration;

use querybase_events::EventBus;
use querybase_store::MetadataStore;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::transport::NotificationTransport;

/// Maximum delivery attempts per notification before giving up (§7
/// "Notification delivery: 30s with up to 5 retries").
pub const MAX_ATTEMPTS: u32 = 5;

/// Base backoff between attempts; doubles each retry.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Owns the background task that drains the event bus and fans each
/// event out to every registered transport.
pub struct NotificationDispatcher {
    handle: JoinHandle<()>,
}

impl NotificationDispatcher {
    /// Spawn the dispatcher. It runs until the event bus subscription is
    /// cancelled or the process exits; callers hold this value only to
    /// abort it on shutdown.
    pub fn spawn(bus: &EventBus, store: MetadataStore, transports: Vec<Arc<dyn NotificationTransport>>) -> Self {
        let mut subscription = bus.subscribe();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.receiver.recv().await {
                let value = serde_json::to_value(&event.payload).unwrap_or(Value::Null);
                let event_type = value
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let inner_payload = value.get("payload").cloned().unwrap_or(Value::Null);

                let record = match store.create_notification(&event_type, &inner_payload).await {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::error!(error = %err, "failed to persist notification record");
                        continue;
                    }
                };

                for transport in &transports {
                    deliver_with_retry(transport.as_ref(), &store, record.id, &event_type, &inner_payload).await;
                }
            }
        });
        Self { handle }
    }

    /// Stop the dispatcher immediately, dropping any in-flight delivery.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn deliver_with_retry(
    transport: &dyn NotificationTransport,
    store: &MetadataStore,
    notification_id: uuid::Uuid,
    event_type: &str,
    payload: &Value,
) {
    let mut backoff = BASE_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        match transport.deliver(event_type, payload).await {
            Ok(()) => {
                if let Err(err) = store.record_notification_attempt(notification_id, true).await {
                    tracing::error!(error = %err, "failed to record notification delivery");
                }
                return;
            }
            Err(err) => {
                tracing::warn!(
                    transport = %transport.name(),
                    attempt,
                    error = %err,
                    "notification delivery attempt failed"
                );
                if let Err(err) = store.record_notification_attempt(notification_id, false).await {
                    tracing::error!(error = %err, "failed to record notification attempt");
                }
                if attempt < MAX_ATTEMPTS {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
    tracing::error!(
        transport = %transport.name(),
        notification_id = %notification_id,
        "notification delivery retries exhausted"
    );
}
