//! Wiring of the sync engine's long-lived services.

use std::sync::Arc;

use erpsync_events::EventBus;
use erpsync_sync::job::SyncJobRunner;
use erpsync_sync::{
    AccountingApi, DuplicateScanner, PendingAdjustmentWorkflow, SyncOrchestrator, SyncStore,
};

use crate::config::WorkerConfig;
use crate::scheduler::SyncScheduler;

/// Every engine service, sharing one store, one remote client and one
/// event bus. The adjustment workflow and the duplicate scanner are
/// exposed for the embedding application's request handlers.
pub struct Services {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub adjustments: Arc<PendingAdjustmentWorkflow>,
    pub duplicates: Arc<DuplicateScanner>,
    pub events: Arc<EventBus>,
}

impl Services {
    pub fn new(
        store: Arc<dyn SyncStore>,
        api: Arc<dyn AccountingApi>,
        events: Arc<EventBus>,
        config: &WorkerConfig,
    ) -> Self {
        let runner = SyncJobRunner::new(
            Arc::clone(&store),
            Arc::clone(&api),
            config.job.clone(),
            Arc::clone(&events),
        );
        let adjustments = PendingAdjustmentWorkflow::new(
            store,
            config.webhook.clone(),
            Arc::clone(&events),
            config.job.store_timeout,
        );
        let duplicates = DuplicateScanner::new(api, config.job.call_timeout);
        Self {
            orchestrator: Arc::new(SyncOrchestrator::new(runner)),
            adjustments: Arc::new(adjustments),
            duplicates: Arc::new(duplicates),
            events,
        }
    }

    pub fn scheduler(&self, config: &WorkerConfig) -> SyncScheduler {
        SyncScheduler::new(
            Arc::clone(&self.orchestrator),
            config.sync_interval,
            config.entities.clone(),
            config.failed_record_retention,
        )
    }
}
