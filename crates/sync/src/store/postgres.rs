//! PostgreSQL-backed [`SyncStore`](super::SyncStore), delegating to the
//! `erpsync-db` repositories.

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
use erpsync_db::repositories::{
    CustomerRepo, FailedSyncRecordRepo, InvoiceRepo, MappingEntryRepo, OrderRepo,
    PendingAdjustmentRepo, StockMovementRepo, SyncMirrorRepo, SyncRunRepo,
};
use erpsync_db::DbPool;

use super::{AdjustmentStore, FailureLog, InternalStore, MappingStore, MirrorStore, RunLog};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RunLog for PgStore {
    async fn open_run(&self, entity: EntityType) -> Result<SyncRun, StoreError> {
        Ok(SyncRunRepo::open(&self.pool, entity).await?)
    }

    async fn close_run(&self, run_id: DbId, close: &CloseSyncRun) -> Result<SyncRun, StoreError> {
        SyncRunRepo::close(&self.pool, run_id, close)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("Sync run {run_id} is not running")))
    }

    async fn last_closed_run(&self, entity: EntityType) -> Result<Option<SyncRun>, StoreError> {
        Ok(SyncRunRepo::last_closed(&self.pool, entity).await?)
    }
}

#[async_trait]
impl FailureLog for PgStore {
    async fn record_failure(
        &self,
        input: &NewFailedSyncRecord,
    ) -> Result<FailedSyncRecord, StoreError> {
        Ok(FailedSyncRecordRepo::insert(&self.pool, input).await?)
    }

    async fn find_failed_record(&self, id: DbId) -> Result<Option<FailedSyncRecord>, StoreError> {
        Ok(FailedSyncRecordRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_failed_records(
        &self,
        filter: &FailedRecordFilter,
    ) -> Result<Vec<FailedSyncRecord>, StoreError> {
        Ok(FailedSyncRecordRepo::list(&self.pool, filter).await?)
    }

    async fn resolve_failed_record(
        &self,
        id: DbId,
    ) -> Result<Option<FailedSyncRecord>, StoreError> {
        Ok(FailedSyncRecordRepo::mark_resolved(&self.pool, id).await?)
    }

    async fn record_retry_failure(
        &self,
        id: DbId,
        error_class: ErrorClass,
        error_message: &str,
    ) -> Result<Option<FailedSyncRecord>, StoreError> {
        Ok(FailedSyncRecordRepo::mark_retry_failed(&self.pool, id, error_class, error_message).await?)
    }

    async fn resolve_failures_for(
        &self,
        entity: EntityType,
        record_id: DbId,
    ) -> Result<u64, StoreError> {
        Ok(FailedSyncRecordRepo::resolve_for_record(&self.pool, entity, record_id).await?)
    }

    async fn purge_resolved_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        Ok(FailedSyncRecordRepo::purge_resolved_before(&self.pool, cutoff).await?)
    }
}

#[async_trait]
impl MirrorStore for PgStore {
    async fn find_mirror(
        &self,
        entity: EntityType,
        internal_id: DbId,
    ) -> Result<Option<SyncMirror>, StoreError> {
        Ok(SyncMirrorRepo::find(&self.pool, entity, internal_id).await?)
    }

    async fn find_mirror_by_natural_key(
        &self,
        entity: EntityType,
        natural_key: &str,
    ) -> Result<Option<SyncMirror>, StoreError> {
        Ok(SyncMirrorRepo::find_by_natural_key(&self.pool, entity, natural_key).await?)
    }

    async fn mark_synced(&self, input: &MirrorSuccess) -> Result<SyncMirror, StoreError> {
        Ok(SyncMirrorRepo::upsert_success(&self.pool, input).await?)
    }

    async fn mark_failed(&self, input: &MirrorFailure) -> Result<SyncMirror, StoreError> {
        Ok(SyncMirrorRepo::upsert_failure(&self.pool, input).await?)
    }
}

#[async_trait]
impl MappingStore for PgStore {
    async fn active_mappings(&self) -> Result<Vec<MappingEntry>, StoreError> {
        Ok(MappingEntryRepo::list_active(&self.pool).await?)
    }
}

#[async_trait]
impl InternalStore for PgStore {
    async fn customer_candidates(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(CustomerRepo::list_sync_candidates(&self.pool).await?)
    }

    async fn stock_candidates(&self) -> Result<Vec<StockMovement>, StoreError> {
        Ok(StockMovementRepo::list_sync_candidates(&self.pool).await?)
    }

    async fn invoice_candidates(&self) -> Result<Vec<Invoice>, StoreError> {
        Ok(InvoiceRepo::list_sync_candidates(&self.pool).await?)
    }

    async fn order_candidates(&self, kind: OrderKind) -> Result<Vec<Order>, StoreError> {
        Ok(OrderRepo::list_sync_candidates(&self.pool, kind).await?)
    }
}

#[async_trait]
impl AdjustmentStore for PgStore {
    async fn insert_adjustment_unless_open(
        &self,
        input: &NewPendingAdjustment,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::insert_unless_open(&self.pool, input).await?)
    }

    async fn find_adjustment(
        &self,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_open_adjustment(
        &self,
        external_order_id: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::find_open_by_order(&self.pool, external_order_id).await?)
    }

    async fn list_adjustments(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::list(&self.pool, filter).await?)
    }

    async fn approve_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        warehouse_code: &str,
    ) -> Result<Option<(PendingStockAdjustment, StockMovement)>, StoreError> {
        Ok(PendingAdjustmentRepo::approve(&self.pool, id, decided_by, warehouse_code).await?)
    }

    async fn reject_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        reason: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::reject(&self.pool, id, decided_by, reason).await?)
    }

    async fn mark_adjustment_applied(
        &self,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        Ok(PendingAdjustmentRepo::mark_applied(&self.pool, id).await?)
    }

    async fn settleable_adjustment_ids(&self) -> Result<Vec<DbId>, StoreError> {
        Ok(PendingAdjustmentRepo::list_settleable_ids(&self.pool).await?)
    }
}
