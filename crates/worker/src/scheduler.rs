//! Periodic sync batches and failed-record retention.
//!
//! Each tick runs `run_all` over the configured entity selection, then
//! purges resolved failed records older than the retention window. The
//! first tick fires immediately on start.

use std::sync::Arc;
use std::time::Duration;

use erpsync_core::entity::EntityType;
use erpsync_sync::{BatchSyncResult, SyncOrchestrator};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    entities: Vec<EntityType>,
    retention: chrono::Duration,
}

impl SyncScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        interval: Duration,
        entities: Vec<EntityType>,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            orchestrator,
            interval,
            entities,
            retention,
        }
    }

    /// Run until `cancel` is triggered.
    ///
    /// A batch already in progress is not interrupted by `cancel`; shut the
    /// orchestrator down to stop in-flight runs between records.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            entities = ?self.entities,
            "Sync scheduler started",
        );

        let mut interval = tokio::time::interval(self.interval);
        // A batch longer than the period delays the next one instead of
        // firing a burst of catch-up ticks.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Sync scheduler stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One scheduled batch plus retention cleanup.
    pub async fn tick(&self) -> BatchSyncResult {
        let batch = self.orchestrator.run_all(Some(&self.entities)).await;
        if batch.overall_success {
            tracing::info!(batch_id = %batch.batch_id, "Scheduled sync batch succeeded");
        } else {
            tracing::warn!(
                batch_id = %batch.batch_id,
                failed = batch.results.iter().filter(|r| !r.is_success()).count(),
                "Scheduled sync batch finished with failures",
            );
        }

        match self.orchestrator.purge_resolved(self.retention).await {
            Ok(0) => tracing::debug!("Retention: no resolved failed records to purge"),
            Ok(purged) => tracing::info!(purged, "Retention: purged resolved failed records"),
            Err(e) => tracing::error!(error = %e, "Retention: cleanup failed"),
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use erpsync_core::duplicate_detection::CatalogEntry;
    use erpsync_core::retry::RemoteError;
    use erpsync_db::models::customer::CreateCustomer;
    use erpsync_events::EventBus;
    use erpsync_sync::job::SyncJobRunner;
    use erpsync_sync::store::MemoryStore;
    use erpsync_sync::{AccountingApi, JobSettings, RemoteAck, SyncStore};

    use super::*;

    struct EchoApi;

    #[async_trait]
    impl AccountingApi for EchoApi {
        async fn create(
            &self,
            _entity: EntityType,
            payload: &serde_json::Value,
        ) -> Result<RemoteAck, RemoteError> {
            Ok(RemoteAck {
                external_id: format!("EXT-{}", payload["account_code"].as_str().unwrap_or("?")),
                external_code: None,
            })
        }

        async fn update(
            &self,
            _entity: EntityType,
            external_id: &str,
            _payload: &serde_json::Value,
        ) -> Result<RemoteAck, RemoteError> {
            Ok(RemoteAck {
                external_id: external_id.to_string(),
                external_code: None,
            })
        }

        async fn list_catalog(&self) -> Result<Vec<CatalogEntry>, RemoteError> {
            Ok(Vec::new())
        }
    }

    fn scheduler(store: Arc<MemoryStore>, entities: Vec<EntityType>) -> SyncScheduler {
        let runner = SyncJobRunner::new(
            store as Arc<dyn SyncStore>,
            Arc::new(EchoApi),
            JobSettings::default(),
            Arc::new(EventBus::default()),
        );
        SyncScheduler::new(
            Arc::new(SyncOrchestrator::new(runner)),
            Duration::from_secs(60),
            entities,
            chrono::Duration::days(30),
        )
    }

    #[tokio::test]
    async fn tick_runs_the_configured_selection() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_customer(CreateCustomer {
                code: "C-1".into(),
                name: "Acme".into(),
                ..Default::default()
            })
            .await;

        let batch = scheduler(store.clone(), vec![EntityType::Customer, EntityType::Stock])
            .tick()
            .await;

        assert!(batch.overall_success);
        let ran: Vec<EntityType> = batch.results.iter().map(|r| r.entity_type).collect();
        assert_eq!(ran, vec![EntityType::Customer, EntityType::Stock]);
        assert_eq!(store.mirrors().await[0].external_id.as_deref(), Some("EXT-C-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_ticks_on_interval_until_cancelled() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            scheduler(store.clone(), vec![EntityType::Invoice]).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        handle.await.unwrap();

        // Ticks at 0s, 60s and 120s.
        assert_eq!(store.runs().await.len(), 3);
    }
}
