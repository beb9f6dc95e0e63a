//! Datastore seam for the sync engine.
//!
//! Split by concern so that each job only reaches for what it needs; the
//! engine itself takes `Arc<dyn SyncStore>`, which every type implementing
//! all concerns gets for free.

use async_trait::async_trait;
use erpsync_core::adjustment::NewPendingAdjustment;
use erpsync_core::entity::EntityType;
use erpsync_core::retry::ErrorClass;
use erpsync_core::types::{DbId, Timestamp};
use erpsync_db::models::customer::Customer;
use erpsync_db::models::failed_sync_record::{
    FailedRecordFilter, FailedSyncRecord, NewFailedSyncRecord,
};
use erpsync_db::models::invoice::Invoice;
use erpsync_db::models::mapping_entry::MappingEntry;
use erpsync_db::models::order::{Order, OrderKind};
use erpsync_db::models::pending_adjustment::{AdjustmentFilter, PendingStockAdjustment};
use erpsync_db::models::stock_movement::StockMovement;
use erpsync_db::models::sync_mirror::{MirrorFailure, MirrorSuccess, SyncMirror};
use erpsync_db::models::sync_run::{CloseSyncRun, SyncRun};

use crate::error::StoreError;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Append-only audit of sync runs.
#[async_trait]
pub trait RunLog: Send + Sync {
    async fn open_run(&self, entity: EntityType) -> Result<SyncRun, StoreError>;

    /// Close a running run. Fails with `Corrupt` if the run is not running.
    async fn close_run(&self, run_id: DbId, close: &CloseSyncRun) -> Result<SyncRun, StoreError>;

    async fn last_closed_run(&self, entity: EntityType) -> Result<Option<SyncRun>, StoreError>;
}

/// Persisted record-level failures.
#[async_trait]
pub trait FailureLog: Send + Sync {
    async fn record_failure(
        &self,
        input: &NewFailedSyncRecord,
    ) -> Result<FailedSyncRecord, StoreError>;

    async fn find_failed_record(&self, id: DbId) -> Result<Option<FailedSyncRecord>, StoreError>;

    async fn list_failed_records(
        &self,
        filter: &FailedRecordFilter,
    ) -> Result<Vec<FailedSyncRecord>, StoreError>;

    /// `failed -> resolved`; `None` if the record is not `failed`.
    async fn resolve_failed_record(
        &self,
        id: DbId,
    ) -> Result<Option<FailedSyncRecord>, StoreError>;

    /// Note a failed replay attempt on a `failed` record.
    async fn record_retry_failure(
        &self,
        id: DbId,
        error_class: ErrorClass,
        error_message: &str,
    ) -> Result<Option<FailedSyncRecord>, StoreError>;

    /// Resolve every open failure of one internal record.
    async fn resolve_failures_for(
        &self,
        entity: EntityType,
        record_id: DbId,
    ) -> Result<u64, StoreError>;

    async fn purge_resolved_before(&self, cutoff: Timestamp) -> Result<u64, StoreError>;
}

/// External mirror state per internal record.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    async fn find_mirror(
        &self,
        entity: EntityType,
        internal_id: DbId,
    ) -> Result<Option<SyncMirror>, StoreError>;

    /// Best mirror for a natural key across all internal records.
    async fn find_mirror_by_natural_key(
        &self,
        entity: EntityType,
        natural_key: &str,
    ) -> Result<Option<SyncMirror>, StoreError>;

    async fn mark_synced(&self, input: &MirrorSuccess) -> Result<SyncMirror, StoreError>;

    async fn mark_failed(&self, input: &MirrorFailure) -> Result<SyncMirror, StoreError>;
}

#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn active_mappings(&self) -> Result<Vec<MappingEntry>, StoreError>;
}

/// Internal records that need a sync attempt: never mirrored, last attempt
/// failed, or changed since the last successful sync.
#[async_trait]
pub trait InternalStore: Send + Sync {
    async fn customer_candidates(&self) -> Result<Vec<Customer>, StoreError>;

    async fn stock_candidates(&self) -> Result<Vec<StockMovement>, StoreError>;

    async fn invoice_candidates(&self) -> Result<Vec<Invoice>, StoreError>;

    async fn order_candidates(&self, kind: OrderKind) -> Result<Vec<Order>, StoreError>;
}

/// Pending stock adjustments. Every transition is a compare-and-set.
#[async_trait]
pub trait AdjustmentStore: Send + Sync {
    /// Insert unless an open adjustment exists for the same external order id.
    async fn insert_adjustment_unless_open(
        &self,
        input: &NewPendingAdjustment,
    ) -> Result<Option<PendingStockAdjustment>, StoreError>;

    async fn find_adjustment(&self, id: DbId)
        -> Result<Option<PendingStockAdjustment>, StoreError>;

    async fn find_open_adjustment(
        &self,
        external_order_id: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError>;

    async fn list_adjustments(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<PendingStockAdjustment>, StoreError>;

    /// `pending -> approved` plus the stock movement, atomically.
    async fn approve_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        warehouse_code: &str,
    ) -> Result<Option<(PendingStockAdjustment, StockMovement)>, StoreError>;

    /// `pending -> rejected`.
    async fn reject_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        reason: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError>;

    /// `approved -> applied`.
    async fn mark_adjustment_applied(
        &self,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, StoreError>;

    /// Approved adjustments whose movement is already synced.
    async fn settleable_adjustment_ids(&self) -> Result<Vec<DbId>, StoreError>;
}

/// Everything the engine needs from the datastore.
pub trait SyncStore:
    RunLog + FailureLog + MirrorStore + MappingStore + InternalStore + AdjustmentStore
{
}

impl<T> SyncStore for T where
    T: RunLog + FailureLog + MirrorStore + MappingStore + InternalStore + AdjustmentStore + ?Sized
{
}
