//! Sync orchestration: at most one run per entity type.
//!
//! Each registered entity type owns a run slot. Acquiring the slot is a
//! single compare-and-swap on an atomic flag; a second request while the
//! flag is set is rejected with [`SyncError::AlreadyRunning`] rather than
//! queued. The flag is released by a drop guard, so an error or a panic
//! inside a run cannot leave it set. Different entity types run
//! concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::sync_status::FailedRecordStatus;
use erpsync_core::types::{DbId, Timestamp};
use erpsync_db::models::failed_sync_record::{FailedRecordFilter, FailedSyncRecord};
use erpsync_db::models::sync_run::SyncRun;
use erpsync_events::{event_types, SyncEvent};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{bounded, SyncError};
use crate::job::{
    CustomerSync, InvoiceSync, OrderSync, ReplayOutcome, StockSync, SyncJobRunner,
};

// ---------------------------------------------------------------------------
// Entity jobs
// ---------------------------------------------------------------------------

/// The closed set of sync jobs, one variant per entity type.
pub enum EntityJob {
    Customer(CustomerSync),
    Stock(StockSync),
    Invoice(InvoiceSync),
    PurchaseOrder(OrderSync),
    SalesOrder(OrderSync),
}

impl EntityJob {
    pub fn for_entity(entity: EntityType) -> Self {
        match entity {
            EntityType::Customer => EntityJob::Customer(CustomerSync),
            EntityType::Stock => EntityJob::Stock(StockSync),
            EntityType::Invoice => EntityJob::Invoice(InvoiceSync),
            EntityType::PurchaseOrder => EntityJob::PurchaseOrder(OrderSync::purchase()),
            EntityType::SalesOrder => EntityJob::SalesOrder(OrderSync::sales()),
        }
    }

    async fn run(
        &self,
        runner: &SyncJobRunner,
        cancel: &CancellationToken,
    ) -> Result<SyncRun, SyncError> {
        match self {
            EntityJob::Customer(job) => runner.run(job, cancel).await,
            EntityJob::Stock(job) => runner.run(job, cancel).await,
            EntityJob::Invoice(job) => runner.run(job, cancel).await,
            EntityJob::PurchaseOrder(job) | EntityJob::SalesOrder(job) => {
                runner.run(job, cancel).await
            }
        }
    }

    async fn replay(
        &self,
        runner: &SyncJobRunner,
        failed: &FailedSyncRecord,
    ) -> Result<ReplayOutcome, SyncError> {
        match self {
            EntityJob::Customer(job) => runner.replay(job, failed).await,
            EntityJob::Stock(job) => runner.replay(job, failed).await,
            EntityJob::Invoice(job) => runner.replay(job, failed).await,
            EntityJob::PurchaseOrder(job) | EntityJob::SalesOrder(job) => {
                runner.replay(job, failed).await
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntityRunOutcome {
    /// The run was opened and closed; see its status.
    Completed(SyncRun),
    /// The run was not started (already running, shutting down, not registered).
    Rejected { reason: String },
    /// The run was opened but aborted, or could not be opened.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityRunResult {
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub outcome: EntityRunOutcome,
}

impl EntityRunResult {
    /// Only a `succeeded` run counts as success.
    pub fn is_success(&self) -> bool {
        match &self.outcome {
            EntityRunOutcome::Completed(run) => run
                .run_status()
                .map(|status| status.is_success())
                .unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSyncResult {
    pub batch_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub results: Vec<EntityRunResult>,
    /// Logical AND of every sub-result.
    pub overall_success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySyncStatus {
    pub entity_type: EntityType,
    pub is_running: bool,
    pub last_run: Option<SyncRun>,
}

// ---------------------------------------------------------------------------
// Run slots
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RunSlot {
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
}

/// Releases a run slot on drop.
struct SlotGuard<'a> {
    slot: &'a RunSlot,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.slot.cancel) = None;
        self.slot.running.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    runner: SyncJobRunner,
    jobs: HashMap<EntityType, EntityJob>,
    slots: HashMap<EntityType, RunSlot>,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    /// Orchestrator with every entity type registered.
    pub fn new(runner: SyncJobRunner) -> Self {
        Self::with_entities(runner, &EntityType::ALL)
    }

    pub fn with_entities(runner: SyncJobRunner, entities: &[EntityType]) -> Self {
        let jobs = entities
            .iter()
            .map(|&entity| (entity, EntityJob::for_entity(entity)))
            .collect();
        let slots = entities
            .iter()
            .map(|&entity| (entity, RunSlot::default()))
            .collect();
        Self {
            runner,
            jobs,
            slots,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn runner(&self) -> &SyncJobRunner {
        &self.runner
    }

    /// Registered entity types in canonical order.
    pub fn registered(&self) -> Vec<EntityType> {
        EntityType::ALL
            .into_iter()
            .filter(|entity| self.jobs.contains_key(entity))
            .collect()
    }

    fn acquire(&self, entity: EntityType) -> Result<(SlotGuard<'_>, CancellationToken), SyncError> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::ShuttingDown);
        }
        let slot = self
            .slots
            .get(&entity)
            .ok_or(SyncError::JobNotRegistered(entity))?;
        if slot
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadyRunning(entity));
        }
        let guard = SlotGuard { slot };
        let token = self.shutdown.child_token();
        *lock(&slot.cancel) = Some(token.clone());
        Ok((guard, token))
    }

    fn job(&self, entity: EntityType) -> Result<&EntityJob, SyncError> {
        self.jobs
            .get(&entity)
            .ok_or(SyncError::JobNotRegistered(entity))
    }

    /// Run one entity type. Rejected immediately if it is already running.
    pub async fn run(&self, entity: EntityType) -> Result<SyncRun, SyncError> {
        let job = self.job(entity)?;
        let (_guard, cancel) = self.acquire(entity)?;
        job.run(&self.runner, &cancel).await
    }

    /// Run the selected entity types (all registered when `None`) one after
    /// another. A failed or rejected entity never stops the others.
    pub async fn run_all(&self, selection: Option<&[EntityType]>) -> BatchSyncResult {
        let batch_id = Uuid::now_v7();
        let started_at = Utc::now();
        let entities = match selection {
            Some(selected) => selected.to_vec(),
            None => self.registered(),
        };
        tracing::info!(%batch_id, entities = entities.len(), "Sync batch started");

        let mut results = Vec::with_capacity(entities.len());
        for entity in entities {
            let outcome = match self.run(entity).await {
                Ok(run) => EntityRunOutcome::Completed(run),
                Err(
                    e @ (SyncError::AlreadyRunning(_)
                    | SyncError::ShuttingDown
                    | SyncError::JobNotRegistered(_)),
                ) => {
                    tracing::warn!(%batch_id, entity_type = %entity, reason = %e, "Sync run rejected");
                    EntityRunOutcome::Rejected {
                        reason: e.to_string(),
                    }
                }
                Err(e) => {
                    tracing::error!(%batch_id, entity_type = %entity, error = %e, "Sync run errored");
                    EntityRunOutcome::Error {
                        message: e.to_string(),
                    }
                }
            };
            results.push(EntityRunResult {
                entity_type: entity,
                outcome,
            });
        }

        let overall_success = results.iter().all(EntityRunResult::is_success);
        tracing::info!(%batch_id, overall_success, "Sync batch finished");
        BatchSyncResult {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            results,
            overall_success,
        }
    }

    pub async fn get_status(&self, entity: EntityType) -> Result<EntitySyncStatus, SyncError> {
        let slot = self
            .slots
            .get(&entity)
            .ok_or(SyncError::JobNotRegistered(entity))?;
        let last_run = bounded(
            "last_closed_run",
            self.runner.settings().store_timeout,
            self.runner.store().last_closed_run(entity),
        )
        .await?;
        Ok(EntitySyncStatus {
            entity_type: entity,
            is_running: slot.running.load(Ordering::Acquire),
            last_run,
        })
    }

    pub async fn status_all(&self) -> Result<Vec<EntitySyncStatus>, SyncError> {
        let mut statuses = Vec::new();
        for entity in self.registered() {
            statuses.push(self.get_status(entity).await?);
        }
        Ok(statuses)
    }

    /// Cancel the in-flight run of `entity` between records. Returns
    /// `false` when nothing was running.
    pub fn cancel(&self, entity: EntityType) -> bool {
        let Some(slot) = self.slots.get(&entity) else {
            return false;
        };
        match lock(&slot.cancel).as_ref() {
            Some(token) => {
                tracing::info!(entity_type = %entity, "Cancelling sync run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight run and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub async fn list_failed_records(
        &self,
        filter: &FailedRecordFilter,
    ) -> Result<Vec<FailedSyncRecord>, SyncError> {
        Ok(bounded(
            "list_failed_records",
            self.runner.settings().store_timeout,
            self.runner.store().list_failed_records(filter),
        )
        .await?)
    }

    /// Re-attempt one failed record. Holds the entity's run slot, so a
    /// replay and a scheduled run of the same entity never overlap.
    pub async fn replay(&self, id: DbId) -> Result<ReplayOutcome, SyncError> {
        let failed = bounded(
            "find_failed_record",
            self.runner.settings().store_timeout,
            self.runner.store().find_failed_record(id),
        )
        .await?
        .ok_or(CoreError::NotFound {
            entity: "failed_sync_record",
            id,
        })?;

        if failed.record_status()? == FailedRecordStatus::Resolved {
            return Err(CoreError::Conflict(format!("Failed record {id} is already resolved")).into());
        }

        let entity = failed.entity()?;
        let job = self.job(entity)?;
        let (_guard, _cancel) = self.acquire(entity)?;
        let outcome = job.replay(&self.runner, &failed).await?;

        let resolved = matches!(outcome, ReplayOutcome::Resolved(_));
        tracing::info!(
            failed_record_id = id,
            entity_type = %entity,
            record_id = failed.record_id,
            resolved,
            "Failed record replayed",
        );
        self.runner.events().publish(
            SyncEvent::new(event_types::FAILED_RECORD_REPLAYED)
                .with_subject("failed_sync_record", id)
                .with_payload(serde_json::json!({
                    "record_type": failed.record_type,
                    "record_id": failed.record_id,
                    "resolved": resolved,
                })),
        );
        Ok(outcome)
    }

    /// Delete resolved failed records older than `retention`.
    pub async fn purge_resolved(&self, retention: chrono::Duration) -> Result<u64, SyncError> {
        let cutoff = Utc::now() - retention;
        let purged = bounded(
            "purge_resolved_before",
            self.runner.settings().store_timeout,
            self.runner.store().purge_resolved_before(cutoff),
        )
        .await?;
        if purged > 0 {
            tracing::info!(purged, %cutoff, "Purged resolved failed records");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_guard_releases_flag_and_token() {
        let slot = RunSlot::default();
        slot.running.store(true, Ordering::Release);
        *lock(&slot.cancel) = Some(CancellationToken::new());
        drop(SlotGuard { slot: &slot });
        assert!(!slot.running.load(Ordering::Acquire));
        assert!(lock(&slot.cancel).is_none());
    }

    #[test]
    fn every_entity_has_a_job() {
        for entity in EntityType::ALL {
            let job = EntityJob::for_entity(entity);
            let matches = matches!(
                (entity, job),
                (EntityType::Customer, EntityJob::Customer(_))
                    | (EntityType::Stock, EntityJob::Stock(_))
                    | (EntityType::Invoice, EntityJob::Invoice(_))
                    | (EntityType::PurchaseOrder, EntityJob::PurchaseOrder(_))
                    | (EntityType::SalesOrder, EntityJob::SalesOrder(_))
            );
            assert!(matches, "{entity} mapped to the wrong job");
        }
    }
}
