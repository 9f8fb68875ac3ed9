//! Event bus (C11, §4.11): in-process pub/sub for `schema_updated`,
//! `approval_created`, `approval_status_changed`, and `stats_changed`.
//! Delivery is fan-out, best-effort, and ordered per subscriber but not
//! across subscribers; a slow subscriber's bounded buffer overflows
//! silently from its own point of view but the drop is counted and
//! logged here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use querybase_core::ids::{ApprovalId, BackendId};
use querybase_core::schema::SchemaSnapshot;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bounded per-subscriber buffer size (§4.11).
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Typed event payloads (§4.11, §6 "Event envelope").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    SchemaUpdated {
        backend_id: BackendId,
        snapshot: Box<SchemaSnapshot>,
    },
    ApprovalCreated {
        approval_id: ApprovalId,
    },
    ApprovalStatusChanged {
        approval_id: ApprovalId,
        new_status: String,
    },
    StatsChanged {
        backend_id: BackendId,
    },
}

/// `{type, at, payload{...}}` (§6 event envelope).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub at: DateTime<Utc>,
}

impl Event {
    #[must_use]
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            at: Utc::now(),
        }
    }
}

struct Subscriber {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

/// A cancellable subscription handle (§4.11 "subscription returns a
/// cancellable handle").
pub struct Subscription {
    id: Uuid,
    bus: Arc<Inner>,
    pub receiver: mpsc::Receiver<Event>,
}

impl Subscription {
    /// Cancel the subscription, removing it from the bus's fan-out list.
    pub fn cancel(self) {
        self.bus.subscribers.remove(&self.id);
    }

    /// Count of events dropped because this subscriber's buffer overflowed.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.bus
            .subscribers
            .get(&self.id)
            .map_or(0, |s| s.dropped.load(Ordering::Relaxed))
    }
}

struct Inner {
    subscribers: DashMap<Uuid, Subscriber>,
}

/// The process-wide event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: DashMap::new(),
            }),
        }
    }

    /// Register a new subscriber with a bounded buffer (§4.11).
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = Uuid::new_v4();
        self.inner.subscribers.insert(
            id,
            Subscriber {
                sender,
                dropped: Arc::new(AtomicU64::new(0)),
            },
        );
        Subscription {
            id,
            bus: self.inner.clone(),
            receiver,
        }
    }

    /// Publish an event to every current subscriber. Fan-out is
    /// best-effort: a full buffer drops the event for that subscriber
    /// only, and the drop is counted (§4.11).
    pub fn publish(&self, payload: EventPayload) {
        let event = Event::new(payload);
        for entry in &self.inner.subscribers {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    entry.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(subscriber = %entry.key(), "event dropped: subscriber buffer full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = %entry.key(), "event dropped: subscriber closed");
                }
            }
        }
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(EventPayload::ApprovalCreated {
            approval_id: ApprovalId::new(),
        });

        let event = sub.receiver.recv().await.unwrap();
        assert!(matches!(event.payload, EventPayload::ApprovalCreated { .. }));
    }

    #[tokio::test]
    async fn cancelled_subscription_stops_receiving() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        sub.cancel();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn overflow_is_counted_not_fatal() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        for _ in 0..(SUBSCRIBER_BUFFER + 5) {
            bus.publish(EventPayload::StatsChanged {
                backend_id: BackendId::new(),
            });
        }

        assert!(sub.dropped_count() > 0);
        // Draining still works for whatever made it into the buffer.
        assert!(sub.receiver.recv().await.is_some());
    }
}
