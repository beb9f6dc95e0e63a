//! Per-entity sync job framework.
//!
//! [`EntitySync`] describes one entity type: how to select candidates,
//! identify a record, fingerprint its content and build the external
//! payload. [`SyncJobRunner`] owns the algorithm shared by every entity:
//!
//! 1. open a `SyncRun`;
//! 2. load the mapping table and the candidate records;
//! 3. attempt every record independently, checking for cancellation
//!    before each one. Candidates sharing a natural key are attempted one
//!    after another so only the first can create the external record;
//!    distinct keys run with at most `max_parallel` in flight;
//! 4. close the run with a status summarizing the per-record outcomes.
//!
//! A failing record is persisted as a `FailedSyncRecord` and never aborts
//! the batch. Only an error while opening the run or loading candidates
//! ends a run early.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::hashing::json_fingerprint;
use erpsync_core::idempotency::{self, SkipReason, SyncVerdict};
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::retry::{ErrorClass, RemoteError, RetryPolicy};
use erpsync_core::sync_status::{summarize_run, SyncRunStatus, CANCELLED_NOTE};
use erpsync_core::types::DbId;
use erpsync_db::models::document_line::DocumentLine;
use erpsync_db::models::failed_sync_record::{FailedSyncRecord, NewFailedSyncRecord};
use erpsync_db::models::mapping_entry::resolver_from_entries;
use erpsync_db::models::sync_mirror::{MirrorFailure, MirrorSuccess, SyncMirror};
use erpsync_db::models::sync_run::{CloseSyncRun, SyncRun};
use erpsync_events::{event_types, EventBus, SyncEvent};
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{bounded, StoreError, SyncError};
use crate::guard::IdempotencyGuard;
use crate::remote::{AccountingApi, RemoteAck};
use crate::settings::JobSettings;
use crate::store::SyncStore;

pub mod customer;
pub mod invoice;
pub mod order;
pub mod stock;

pub use customer::CustomerSync;
pub use invoice::InvoiceSync;
pub use order::OrderSync;
pub use stock::StockSync;

// ---------------------------------------------------------------------------
// Job contract
// ---------------------------------------------------------------------------

/// Shared handles passed to job hooks.
pub struct JobContext<'a> {
    pub store: &'a dyn SyncStore,
    pub events: &'a EventBus,
    pub store_timeout: Duration,
}

/// One entity type's part of the sync algorithm.
#[async_trait]
pub trait EntitySync: Send + Sync {
    /// The internal record. Serialized verbatim into `FailedSyncRecord`
    /// so a replay can rebuild it without re-reading the source table.
    type Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    fn entity_type(&self) -> EntityType;

    fn internal_id(&self, record: &Self::Record) -> DbId;

    /// Business identity used by the idempotency guard.
    fn natural_key(&self, record: &Self::Record) -> String;

    /// The fields that end up in the external payload, before mapping.
    fn content(&self, record: &Self::Record) -> serde_json::Value;

    fn fingerprint(&self, record: &Self::Record) -> String {
        json_fingerprint(&self.content(record))
    }

    async fn select_eligible(
        &self,
        store: &dyn SyncStore,
    ) -> Result<Vec<Self::Record>, StoreError>;

    /// Translate codes and shape the request body. A missing mapping must
    /// surface as `CoreError::MappingMissing`.
    fn build_payload(
        &self,
        record: &Self::Record,
        mappings: &MappingResolver,
    ) -> Result<serde_json::Value, CoreError>;

    /// Hook after the record is mirrored as synced.
    async fn apply_result(
        &self,
        _ctx: &JobContext<'_>,
        _record: &Self::Record,
        _ack: &RemoteAck,
    ) -> Result<(), StoreError> {
        Ok(())
    }

    /// Hook before candidates are selected. Failure is logged, not fatal.
    async fn before_run(&self, _ctx: &JobContext<'_>) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one record within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RecordOutcome {
    Synced,
    /// Guard verdict `Skip`, or a record parked on a non-retryable failure.
    Skipped,
    Failed,
    /// Not attempted because the run was cancelled.
    Cancelled,
}

/// Result of attempting one record against the external platform.
#[derive(Debug)]
enum Attempt {
    Synced,
    Skipped,
    Failed { class: ErrorClass, message: String },
}

/// Result of replaying a failed record.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayOutcome {
    /// The record is now mirrored and the failed record is `resolved`.
    Resolved(FailedSyncRecord),
    /// The replay failed again; the failed record stays `failed` with the
    /// new error and an incremented `retry_count`.
    StillFailing(FailedSyncRecord),
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Executes [`EntitySync`] jobs against a store and the external API.
pub struct SyncJobRunner {
    store: Arc<dyn SyncStore>,
    api: Arc<dyn AccountingApi>,
    settings: JobSettings,
    events: Arc<EventBus>,
    retry: RetryPolicy,
}

impl SyncJobRunner {
    pub fn new(
        store: Arc<dyn SyncStore>,
        api: Arc<dyn AccountingApi>,
        settings: JobSettings,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            api,
            settings,
            events,
            retry: RetryPolicy,
        }
    }

    pub fn store(&self) -> &dyn SyncStore {
        self.store.as_ref()
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn context(&self) -> JobContext<'_> {
        JobContext {
            store: self.store.as_ref(),
            events: &self.events,
            store_timeout: self.settings.store_timeout,
        }
    }

    /// Run one job to completion or cancellation and return the closed run.
    pub async fn run<J: EntitySync>(
        &self,
        job: &J,
        cancel: &CancellationToken,
    ) -> Result<SyncRun, SyncError> {
        let entity = job.entity_type();
        let limit = self.settings.store_timeout;
        let run = bounded("open_run", limit, self.store.open_run(entity)).await?;
        tracing::info!(entity_type = %entity, run_id = run.id, "Sync run started");

        let ctx = self.context();
        if let Err(e) = job.before_run(&ctx).await {
            tracing::warn!(entity_type = %entity, run_id = run.id, error = %e, "Pre-run hook failed");
        }

        let prepared = async {
            let entries = bounded("active_mappings", limit, self.store.active_mappings()).await?;
            let records = bounded(
                "select_eligible",
                limit,
                job.select_eligible(self.store.as_ref()),
            )
            .await?;
            Ok::<_, StoreError>((resolver_from_entries(&entries), records))
        }
        .await;

        let (mappings, records) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::error!(entity_type = %entity, run_id = run.id, error = %e, "Sync run aborted");
                let close = CloseSyncRun {
                    status: SyncRunStatus::Failed,
                    success_count: 0,
                    failure_count: 0,
                    skipped_count: 0,
                    note: Some(format!("aborted: {e}")),
                };
                match bounded("close_run", limit, self.store.close_run(run.id, &close)).await {
                    Ok(closed) => self.publish_completed(&closed),
                    Err(close_err) => tracing::error!(
                        run_id = run.id,
                        error = %close_err,
                        "Failed to close aborted sync run",
                    ),
                }
                return Err(e.into());
            }
        };

        tracing::info!(
            entity_type = %entity,
            run_id = run.id,
            candidates = records.len(),
            "Sync candidates selected",
        );

        let outcomes: Vec<Vec<RecordOutcome>> = stream::iter(group_by_natural_key(job, records))
            .map(|group| self.process_group(job, &mappings, run.id, group, cancel))
            .buffer_unordered(self.settings.max_parallel.max(1))
            .collect()
            .await;

        let mut success_count = 0;
        let mut failure_count = 0;
        let mut skipped_count = 0;
        let mut cancelled = false;
        for outcome in outcomes.iter().flatten() {
            match outcome {
                RecordOutcome::Synced => success_count += 1,
                RecordOutcome::Skipped => skipped_count += 1,
                RecordOutcome::Failed => failure_count += 1,
                RecordOutcome::Cancelled => cancelled = true,
            }
        }

        let close = CloseSyncRun {
            status: summarize_run(success_count, failure_count, cancelled),
            success_count,
            failure_count,
            skipped_count,
            note: cancelled.then(|| CANCELLED_NOTE.to_string()),
        };
        let closed = bounded("close_run", limit, self.store.close_run(run.id, &close)).await?;

        tracing::info!(
            entity_type = %entity,
            run_id = closed.id,
            status = %closed.status,
            success_count,
            failure_count,
            skipped_count,
            "Sync run finished",
        );
        self.publish_completed(&closed);
        Ok(closed)
    }

    /// Re-attempt a failed record from its stored snapshot.
    ///
    /// Mappings are loaded fresh, so a replay after an administrator added
    /// the missing mapping succeeds. Parking does not apply to replays.
    pub async fn replay<J: EntitySync>(
        &self,
        job: &J,
        failed: &FailedSyncRecord,
    ) -> Result<ReplayOutcome, SyncError> {
        let limit = self.settings.store_timeout;
        let record: J::Record = serde_json::from_value(failed.original_payload.clone())
            .map_err(StoreError::from)?;
        let entries = bounded("active_mappings", limit, self.store.active_mappings()).await?;
        let mappings = resolver_from_entries(&entries);

        let entity = job.entity_type();
        let id = job.internal_id(&record);
        let own = bounded("find_mirror", limit, self.store.find_mirror(entity, id)).await?;

        let updated = match self.attempt(job, &mappings, &record, own.as_ref()).await? {
            Attempt::Synced | Attempt::Skipped => {
                let resolved = bounded(
                    "resolve_failed_record",
                    limit,
                    self.store.resolve_failed_record(failed.id),
                )
                .await?;
                // Older failure rows of the same record are settled too.
                self.resolve_open_failures(entity, id).await?;
                resolved.map(ReplayOutcome::Resolved)
            }
            Attempt::Failed { class, message } => bounded(
                "record_retry_failure",
                limit,
                self.store.record_retry_failure(failed.id, class, &message),
            )
            .await?
            .map(ReplayOutcome::StillFailing),
        };

        updated.ok_or_else(|| {
            CoreError::Conflict(format!(
                "Failed record {} was resolved concurrently",
                failed.id
            ))
            .into()
        })
    }

    // ---- per record ----

    async fn process_group<J: EntitySync>(
        &self,
        job: &J,
        mappings: &MappingResolver,
        run_id: DbId,
        group: Vec<J::Record>,
        cancel: &CancellationToken,
    ) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(group.len());
        for record in group {
            outcomes.push(self.process(job, mappings, run_id, record, cancel).await);
        }
        outcomes
    }

    async fn process<J: EntitySync>(
        &self,
        job: &J,
        mappings: &MappingResolver,
        run_id: DbId,
        record: J::Record,
        cancel: &CancellationToken,
    ) -> RecordOutcome {
        if cancel.is_cancelled() {
            return RecordOutcome::Cancelled;
        }

        let entity = job.entity_type();
        let id = job.internal_id(&record);
        match self.process_inner(job, mappings, run_id, &record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    entity_type = %entity,
                    run_id,
                    record_id = id,
                    error = %e,
                    "Datastore error while syncing record",
                );
                RecordOutcome::Failed
            }
        }
    }

    async fn process_inner<J: EntitySync>(
        &self,
        job: &J,
        mappings: &MappingResolver,
        run_id: DbId,
        record: &J::Record,
    ) -> Result<RecordOutcome, StoreError> {
        let limit = self.settings.store_timeout;
        let entity = job.entity_type();
        let id = job.internal_id(record);
        let own = bounded("find_mirror", limit, self.store.find_mirror(entity, id)).await?;

        if let Some(mirror) = &own {
            if idempotency::is_parked(&self.retry, &mirror.view(), &job.fingerprint(record)) {
                tracing::debug!(
                    entity_type = %entity,
                    record_id = id,
                    error_class = mirror.last_error_class.as_deref().unwrap_or_default(),
                    "Record parked until its content changes or it is replayed",
                );
                return Ok(RecordOutcome::Skipped);
            }
        }

        match self.attempt(job, mappings, record, own.as_ref()).await? {
            Attempt::Synced => {
                self.resolve_open_failures(entity, id).await?;
                Ok(RecordOutcome::Synced)
            }
            Attempt::Skipped => {
                self.resolve_open_failures(entity, id).await?;
                Ok(RecordOutcome::Skipped)
            }
            Attempt::Failed { class, message } => {
                let input = NewFailedSyncRecord {
                    run_id,
                    record_type: entity,
                    record_id: id,
                    natural_key: job.natural_key(record),
                    error_class: class,
                    error_message: message,
                    original_payload: serde_json::to_value(record)?,
                };
                bounded("record_failure", limit, self.store.record_failure(&input)).await?;
                Ok(RecordOutcome::Failed)
            }
        }
    }

    /// Guard, map, call, and write the mirror. Shared by runs and replays.
    async fn attempt<J: EntitySync>(
        &self,
        job: &J,
        mappings: &MappingResolver,
        record: &J::Record,
        own: Option<&SyncMirror>,
    ) -> Result<Attempt, StoreError> {
        let limit = self.settings.store_timeout;
        let entity = job.entity_type();
        let id = job.internal_id(record);
        let natural_key = job.natural_key(record);
        let content_hash = job.fingerprint(record);

        let resolution = IdempotencyGuard::new(self.store.as_ref(), limit)
            .resolve(entity, own, &natural_key, &content_hash)
            .await?;

        let external_id = match &resolution.verdict {
            SyncVerdict::Skip(SkipReason::Unchanged { external_id }) => {
                tracing::debug!(
                    entity_type = %entity,
                    record_id = id,
                    natural_key = %natural_key,
                    external_id = %external_id,
                    "Record unchanged, skipping",
                );
                let ack = RemoteAck {
                    external_id: external_id.clone(),
                    external_code: resolution.external_code.clone(),
                };
                self.record_success(job, record, &natural_key, &content_hash, &ack)
                    .await?;
                return Ok(Attempt::Skipped);
            }
            SyncVerdict::Create => None,
            SyncVerdict::Update { external_id } => Some(external_id.as_str()),
        };

        let outcome = match job.build_payload(record, mappings) {
            Ok(payload) => self
                .call_remote(entity, external_id, &payload)
                .await
                .map_err(|e| (self.retry.classify(&e), e.to_string())),
            Err(e @ CoreError::MappingMissing { .. }) => {
                Err((ErrorClass::MappingMissing, e.to_string()))
            }
            Err(e) => Err((ErrorClass::Validation, e.to_string())),
        };

        match outcome {
            Ok(ack) => {
                let ack = RemoteAck {
                    external_code: ack.external_code.or(resolution.external_code),
                    ..ack
                };
                self.record_success(job, record, &natural_key, &content_hash, &ack)
                    .await?;
                tracing::debug!(
                    entity_type = %entity,
                    record_id = id,
                    external_id = %ack.external_id,
                    "Record synced",
                );
                Ok(Attempt::Synced)
            }
            Err((class, message)) => {
                tracing::warn!(
                    entity_type = %entity,
                    record_id = id,
                    natural_key = %natural_key,
                    error_class = %class,
                    error = %message,
                    "Record sync failed",
                );
                let failure = MirrorFailure {
                    entity_type: entity,
                    internal_id: id,
                    natural_key,
                    error_class: class,
                    error_message: message.clone(),
                    attempt_hash: content_hash,
                };
                bounded("mark_failed", limit, self.store.mark_failed(&failure)).await?;
                Ok(Attempt::Failed { class, message })
            }
        }
    }

    async fn call_remote(
        &self,
        entity: EntityType,
        external_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError> {
        let timeout = self.settings.call_timeout;
        let call = async {
            match external_id {
                Some(external_id) => self.api.update(entity, external_id, payload).await,
                None => self.api.create(entity, payload).await,
            }
        };
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout {
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    async fn record_success<J: EntitySync>(
        &self,
        job: &J,
        record: &J::Record,
        natural_key: &str,
        content_hash: &str,
        ack: &RemoteAck,
    ) -> Result<(), StoreError> {
        let limit = self.settings.store_timeout;
        let entity = job.entity_type();
        let id = job.internal_id(record);
        let success = MirrorSuccess {
            entity_type: entity,
            internal_id: id,
            natural_key: natural_key.to_string(),
            external_id: ack.external_id.clone(),
            external_code: ack.external_code.clone(),
            content_hash: content_hash.to_string(),
        };
        bounded("mark_synced", limit, self.store.mark_synced(&success)).await?;

        if let Err(e) = job.apply_result(&self.context(), record, ack).await {
            tracing::warn!(
                entity_type = %entity,
                record_id = id,
                error = %e,
                "Post-sync hook failed",
            );
        }
        Ok(())
    }

    async fn resolve_open_failures(&self, entity: EntityType, id: DbId) -> Result<u64, StoreError> {
        bounded(
            "resolve_failures_for",
            self.settings.store_timeout,
            self.store.resolve_failures_for(entity, id),
        )
        .await
    }

    fn publish_completed(&self, run: &SyncRun) {
        self.events.publish(
            SyncEvent::new(event_types::SYNC_RUN_COMPLETED)
                .with_subject("sync_run", run.id)
                .with_payload(serde_json::json!({
                    "entity_type": run.entity_type,
                    "status": run.status,
                    "success_count": run.success_count,
                    "failure_count": run.failure_count,
                    "skipped_count": run.skipped_count,
                    "note": run.note,
                })),
        );
    }
}

// ---------------------------------------------------------------------------
// Helpers shared by the entity jobs
// ---------------------------------------------------------------------------

/// Bucket candidates by natural key, keeping first-seen order.
fn group_by_natural_key<J: EntitySync>(job: &J, records: Vec<J::Record>) -> Vec<Vec<J::Record>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<J::Record>> = Vec::new();
    for record in records {
        match index.entry(job.natural_key(&record)) {
            Entry::Occupied(slot) => groups[*slot.get()].push(record),
            Entry::Vacant(slot) => {
                slot.insert(groups.len());
                groups.push(vec![record]);
            }
        }
    }
    groups
}

/// Map the line items of an invoice or order. A document without lines
/// is refused before any remote call.
pub(crate) fn map_lines(
    document: &str,
    lines: &[DocumentLine],
    mappings: &MappingResolver,
) -> Result<Vec<serde_json::Value>, CoreError> {
    if lines.is_empty() {
        return Err(CoreError::Validation(format!("{document} has no lines")));
    }
    lines
        .iter()
        .map(|line| {
            Ok(serde_json::json!({
                "stock_code": mappings.translate(MappingType::Sku, &line.sku)?,
                "unit_code": mappings.translate_opt(MappingType::Unit, line.unit_code.as_deref())?,
                "quantity": line.quantity,
                "unit_price_minor": line.unit_price_minor,
                "tax_rate_percent": line.tax_rate_percent,
            }))
        })
        .collect()
}
