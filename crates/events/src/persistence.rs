//! Durable event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! and appends every received [`SyncEvent`] to `sync_events`. It exits when
//! the bus is dropped.

use erpsync_core::types::DbId;
use erpsync_db::repositories::EventRepo;
use erpsync_db::DbPool;
use tokio::sync::broadcast;

use crate::bus::SyncEvent;

pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel closes.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<SyncEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            event_type = %event.event_type,
                            "Failed to persist event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &SyncEvent) -> Result<DbId, sqlx::Error> {
        EventRepo::insert(
            pool,
            &event.event_type,
            event.entity_type.as_deref(),
            event.entity_id,
            event.actor.as_deref(),
            &event.payload,
        )
        .await
    }
}
