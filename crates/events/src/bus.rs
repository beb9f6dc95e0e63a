//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>` between the orchestrator, the
//! adjustment workflow and the persistence task.

use chrono::{DateTime, Utc};
use erpsync_core::types::DbId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dot-separated event names.
pub mod event_types {
    pub const ADJUSTMENT_RECEIVED: &str = "adjustment.received";
    pub const ADJUSTMENT_APPROVED: &str = "adjustment.approved";
    pub const ADJUSTMENT_REJECTED: &str = "adjustment.rejected";
    pub const ADJUSTMENT_APPLIED: &str = "adjustment.applied";
    pub const SYNC_RUN_COMPLETED: &str = "sync_run.completed";
    pub const FAILED_RECORD_REPLAYED: &str = "failed_record.replayed";
}

// ---------------------------------------------------------------------------
// SyncEvent
// ---------------------------------------------------------------------------

/// A domain event emitted by the sync subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// One of [`event_types`].
    pub event_type: String,
    /// Subject kind, e.g. `"pending_adjustment"` or an entity type name.
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    /// Operator or source that caused the event.
    pub actor: Option<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            entity_type: None,
            entity_id: None,
            actor: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_subject(mut self, entity_type: impl Into<String>, entity_id: DbId) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and
/// slow receivers observe `RecvError::Lagged`.
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Dropped silently when nobody listens.
    pub fn publish(&self, event: SyncEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_enriched_event() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(
            SyncEvent::new(event_types::ADJUSTMENT_APPROVED)
                .with_subject("pending_adjustment", 42)
                .with_actor("ops@example.com")
                .with_payload(serde_json::json!({ "quantity_delta": -5 })),
        );

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.event_type, "adjustment.approved");
        assert_eq!(received.entity_type.as_deref(), Some("pending_adjustment"));
        assert_eq!(received.entity_id, Some(42));
        assert_eq!(received.actor.as_deref(), Some("ops@example.com"));
        assert_eq!(received.payload["quantity_delta"], -5);
    }

    #[test]
    fn publish_without_subscribers_is_silent() {
        EventBus::default().publish(SyncEvent::new(event_types::SYNC_RUN_COMPLETED));
    }
}
