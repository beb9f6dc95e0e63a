//! In-memory [`SyncStore`](super::SyncStore) for tests and local runs.
//!
//! Mirrors the SQL semantics of the repositories: compare-and-set status
//! transitions, the open-adjustment uniqueness rule and the candidate
//! predicate (never mirrored, last attempt failed, or changed since the
//! last successful sync).

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use erpsync_core::adjustment::{AdjustmentStatus, NewPendingAdjustment};
use erpsync_core::entity::EntityType;
use erpsync_core::mapping::MappingType;
use erpsync_core::retry::{ErrorClass, RetryPolicy};
use erpsync_core::sync_status::{FailedRecordStatus, SyncRunStatus};
use erpsync_core::types::{DbId, Timestamp};
use erpsync_db::models::customer::{CreateCustomer, Customer};
use erpsync_db::models::failed_sync_record::{
    page_bounds, FailedRecordFilter, FailedSyncRecord, NewFailedSyncRecord,
};
use erpsync_db::models::invoice::{CreateInvoice, Invoice};
use erpsync_db::models::mapping_entry::MappingEntry;
use erpsync_db::models::order::{CreateOrder, Order, OrderKind};
use erpsync_db::models::pending_adjustment::{AdjustmentFilter, PendingStockAdjustment};
use erpsync_db::models::stock_movement::{NewStockMovement, StockMovement};
use erpsync_db::models::sync_mirror::{MirrorFailure, MirrorSuccess, SyncMirror};
use erpsync_db::models::sync_run::{CloseSyncRun, SyncRun};
use sqlx::types::Json;
use tokio::sync::Mutex;

use super::{AdjustmentStore, FailureLog, InternalStore, MappingStore, MirrorStore, RunLog};
use crate::error::StoreError;

#[derive(Default)]
struct State {
    next_id: DbId,
    last_tick: Option<Timestamp>,
    runs: Vec<SyncRun>,
    failures: Vec<FailedSyncRecord>,
    mirrors: Vec<SyncMirror>,
    mappings: Vec<MappingEntry>,
    customers: Vec<Customer>,
    movements: Vec<StockMovement>,
    invoices: Vec<Invoice>,
    orders: Vec<Order>,
    adjustments: Vec<PendingStockAdjustment>,
    /// Entity types whose candidate listing fails as if the pool were exhausted.
    unavailable: HashSet<EntityType>,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing wall clock, so "changed since last sync"
    /// comparisons never tie.
    fn tick(&mut self) -> Timestamp {
        let mut now = Utc::now();
        if let Some(last) = self.last_tick {
            if now <= last {
                now = last + chrono::Duration::microseconds(1);
            }
        }
        self.last_tick = Some(now);
        now
    }

    fn mirror(&self, entity: EntityType, internal_id: DbId) -> Option<&SyncMirror> {
        self.mirrors
            .iter()
            .find(|m| m.entity_type == entity.as_str() && m.internal_id == internal_id)
    }

    fn needs_sync(&self, entity: EntityType, internal_id: DbId, updated_at: Timestamp) -> bool {
        match self.mirror(entity, internal_id) {
            None => true,
            Some(m) => !m.is_synced || m.last_sync_at.map_or(true, |last| updated_at > last),
        }
    }

    fn check_available(&self, entity: EntityType) -> Result<(), StoreError> {
        if self.unavailable.contains(&entity) {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }

    fn touch(&mut self, entity: EntityType, id: DbId) -> bool {
        let now = self.tick();
        let updated_at = match entity {
            EntityType::Customer => self
                .customers
                .iter_mut()
                .find(|c| c.id == id)
                .map(|c| &mut c.updated_at),
            EntityType::Stock => self
                .movements
                .iter_mut()
                .find(|m| m.id == id)
                .map(|m| &mut m.updated_at),
            EntityType::Invoice => self
                .invoices
                .iter_mut()
                .find(|i| i.id == id)
                .map(|i| &mut i.updated_at),
            EntityType::PurchaseOrder | EntityType::SalesOrder => self
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .map(|o| &mut o.updated_at),
        };
        match updated_at {
            Some(at) => {
                *at = now;
                true
            }
            None => false,
        }
    }

    fn insert_movement(&mut self, input: &NewStockMovement) -> StockMovement {
        let now = self.tick();
        let movement = StockMovement {
            id: self.next_id(),
            sku: input.sku.clone(),
            product_id: input.product_id,
            warehouse_code: input.warehouse_code.clone(),
            unit_code: input.unit_code.clone(),
            quantity_delta: input.quantity_delta,
            movement_type: input.movement_type.as_str().to_string(),
            source_document: input.source_document.clone(),
            pending_adjustment_id: input.pending_adjustment_id,
            occurred_at: input.occurred_at,
            created_at: now,
            updated_at: now,
        };
        self.movements.push(movement.clone());
        movement
    }

    /// Compare-and-set on an adjustment's status.
    fn transition(
        &mut self,
        id: DbId,
        from: AdjustmentStatus,
        apply: impl FnOnce(&mut PendingStockAdjustment, Timestamp),
    ) -> Option<PendingStockAdjustment> {
        let now = self.tick();
        let row = self
            .adjustments
            .iter_mut()
            .find(|a| a.id == id && a.status == from.as_str())?;
        apply(row, now);
        row.updated_at = now;
        Some(row.clone())
    }
}

/// Thread-safe in-memory datastore.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    pub async fn insert_customer(&self, input: CreateCustomer) -> Customer {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let customer = Customer {
            id: state.next_id(),
            code: input.code,
            name: input.name,
            tax_number: input.tax_number,
            tax_office: input.tax_office,
            email: input.email,
            phone: input.phone,
            address: input.address,
            city: input.city,
            country: input.country,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.customers.push(customer.clone());
        customer
    }

    pub async fn insert_movement(&self, input: NewStockMovement) -> StockMovement {
        self.state.lock().await.insert_movement(&input)
    }

    pub async fn insert_invoice(&self, input: CreateInvoice) -> Invoice {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let invoice = Invoice {
            id: state.next_id(),
            invoice_number: input.invoice_number,
            customer_code: input.customer_code,
            issued_at: input.issued_at,
            currency: input.currency,
            warehouse_code: input.warehouse_code,
            lines: Json(input.lines),
            created_at: now,
            updated_at: now,
        };
        state.invoices.push(invoice.clone());
        invoice
    }

    pub async fn insert_order(&self, input: CreateOrder) -> Order {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let order = Order {
            id: state.next_id(),
            kind: input.kind.as_str().to_string(),
            order_number: input.order_number,
            counterparty_code: input.counterparty_code,
            ordered_at: input.ordered_at,
            warehouse_code: input.warehouse_code,
            currency: input.currency,
            lines: Json(input.lines),
            created_at: now,
            updated_at: now,
        };
        state.orders.push(order.clone());
        order
    }

    pub async fn add_mapping(
        &self,
        mapping_type: MappingType,
        source_value: &str,
        target_value: &str,
    ) -> MappingEntry {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let source_value = source_value.trim().to_string();
        state
            .mappings
            .retain(|m| !(m.mapping_type == mapping_type.as_str() && m.source_value == source_value));
        let entry = MappingEntry {
            id: state.next_id(),
            mapping_type: mapping_type.as_str().to_string(),
            source_value,
            target_value: target_value.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        state.mappings.push(entry.clone());
        entry
    }

    /// Edit a customer in place and bump its `updated_at`.
    pub async fn update_customer(
        &self,
        id: DbId,
        edit: impl FnOnce(&mut Customer),
    ) -> Option<Customer> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let customer = state.customers.iter_mut().find(|c| c.id == id)?;
        edit(customer);
        customer.updated_at = now;
        Some(customer.clone())
    }

    /// Bump `updated_at` without changing content. Returns `false` for an
    /// unknown record.
    pub async fn touch(&self, entity: EntityType, id: DbId) -> bool {
        self.state.lock().await.touch(entity, id)
    }

    /// Make candidate listing for `entity` fail until reset.
    pub async fn set_unavailable(&self, entity: EntityType, unavailable: bool) {
        let mut state = self.state.lock().await;
        if unavailable {
            state.unavailable.insert(entity);
        } else {
            state.unavailable.remove(&entity);
        }
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub async fn runs(&self) -> Vec<SyncRun> {
        self.state.lock().await.runs.clone()
    }

    pub async fn mirrors(&self) -> Vec<SyncMirror> {
        self.state.lock().await.mirrors.clone()
    }

    pub async fn failed_records(&self) -> Vec<FailedSyncRecord> {
        self.state.lock().await.failures.clone()
    }

    pub async fn adjustments(&self) -> Vec<PendingStockAdjustment> {
        self.state.lock().await.adjustments.clone()
    }

    pub async fn movements(&self) -> Vec<StockMovement> {
        self.state.lock().await.movements.clone()
    }
}

#[async_trait]
impl RunLog for MemoryStore {
    async fn open_run(&self, entity: EntityType) -> Result<SyncRun, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let run = SyncRun {
            id: state.next_id(),
            entity_type: entity.as_str().to_string(),
            status: SyncRunStatus::Running.as_str().to_string(),
            started_at: now,
            ended_at: None,
            success_count: 0,
            failure_count: 0,
            skipped_count: 0,
            note: None,
        };
        state.runs.push(run.clone());
        Ok(run)
    }

    async fn close_run(&self, run_id: DbId, close: &CloseSyncRun) -> Result<SyncRun, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == SyncRunStatus::Running.as_str())
            .ok_or_else(|| StoreError::Corrupt(format!("Sync run {run_id} is not running")))?;
        run.status = close.status.as_str().to_string();
        run.ended_at = Some(now);
        run.success_count = close.success_count;
        run.failure_count = close.failure_count;
        run.skipped_count = close.skipped_count;
        run.note = close.note.clone();
        Ok(run.clone())
    }

    async fn last_closed_run(&self, entity: EntityType) -> Result<Option<SyncRun>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .runs
            .iter()
            .filter(|r| {
                r.entity_type == entity.as_str() && r.status != SyncRunStatus::Running.as_str()
            })
            .max_by_key(|r| (r.ended_at, r.id))
            .cloned())
    }
}

#[async_trait]
impl FailureLog for MemoryStore {
    async fn record_failure(
        &self,
        input: &NewFailedSyncRecord,
    ) -> Result<FailedSyncRecord, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let record = FailedSyncRecord {
            id: state.next_id(),
            run_id: input.run_id,
            record_type: input.record_type.as_str().to_string(),
            record_id: input.record_id,
            natural_key: input.natural_key.clone(),
            error_class: input.error_class.as_str().to_string(),
            error_message: input.error_message.clone(),
            original_payload: input.original_payload.clone(),
            failed_at: now,
            status: FailedRecordStatus::Failed.as_str().to_string(),
            retry_count: 0,
            last_retry_at: None,
            resolved_at: None,
        };
        state.failures.push(record.clone());
        Ok(record)
    }

    async fn find_failed_record(&self, id: DbId) -> Result<Option<FailedSyncRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.failures.iter().find(|f| f.id == id).cloned())
    }

    async fn list_failed_records(
        &self,
        filter: &FailedRecordFilter,
    ) -> Result<Vec<FailedSyncRecord>, StoreError> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let state = self.state.lock().await;
        let mut rows: Vec<FailedSyncRecord> = state
            .failures
            .iter()
            .filter(|f| filter.record_type.map_or(true, |e| f.record_type == e.as_str()))
            .filter(|f| filter.status.map_or(true, |s| f.status == s.as_str()))
            .filter(|f| filter.error_class.map_or(true, |c| f.error_class == c.as_str()))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.failed_at, b.id).cmp(&(a.failed_at, a.id)));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn resolve_failed_record(
        &self,
        id: DbId,
    ) -> Result<Option<FailedSyncRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        Ok(state
            .failures
            .iter_mut()
            .find(|f| f.id == id && f.status == FailedRecordStatus::Failed.as_str())
            .map(|f| {
                f.status = FailedRecordStatus::Resolved.as_str().to_string();
                f.resolved_at = Some(now);
                f.retry_count += 1;
                f.last_retry_at = Some(now);
                f.clone()
            }))
    }

    async fn record_retry_failure(
        &self,
        id: DbId,
        error_class: ErrorClass,
        error_message: &str,
    ) -> Result<Option<FailedSyncRecord>, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        Ok(state
            .failures
            .iter_mut()
            .find(|f| f.id == id && f.status == FailedRecordStatus::Failed.as_str())
            .map(|f| {
                f.error_class = error_class.as_str().to_string();
                f.error_message = error_message.to_string();
                f.retry_count += 1;
                f.last_retry_at = Some(now);
                f.clone()
            }))
    }

    async fn resolve_failures_for(
        &self,
        entity: EntityType,
        record_id: DbId,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let mut resolved = 0;
        for f in state.failures.iter_mut().filter(|f| {
            f.record_type == entity.as_str()
                && f.record_id == record_id
                && f.status == FailedRecordStatus::Failed.as_str()
        }) {
            f.status = FailedRecordStatus::Resolved.as_str().to_string();
            f.resolved_at = Some(now);
            resolved += 1;
        }
        Ok(resolved)
    }

    async fn purge_resolved_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.failures.len();
        state.failures.retain(|f| {
            !(f.status == FailedRecordStatus::Resolved.as_str()
                && f.resolved_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - state.failures.len()) as u64)
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    async fn find_mirror(
        &self,
        entity: EntityType,
        internal_id: DbId,
    ) -> Result<Option<SyncMirror>, StoreError> {
        Ok(self.state.lock().await.mirror(entity, internal_id).cloned())
    }

    async fn find_mirror_by_natural_key(
        &self,
        entity: EntityType,
        natural_key: &str,
    ) -> Result<Option<SyncMirror>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .mirrors
            .iter()
            .filter(|m| m.entity_type == entity.as_str() && m.natural_key == natural_key)
            .max_by_key(|m| (m.external_id.is_some(), m.is_synced, m.updated_at))
            .cloned())
    }

    async fn mark_synced(&self, input: &MirrorSuccess) -> Result<SyncMirror, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let entity = input.entity_type.as_str();
        if let Some(m) = state
            .mirrors
            .iter_mut()
            .find(|m| m.entity_type == entity && m.internal_id == input.internal_id)
        {
            m.natural_key = input.natural_key.clone();
            m.external_id = Some(input.external_id.clone());
            if input.external_code.is_some() {
                m.external_code = input.external_code.clone();
            }
            m.is_synced = true;
            m.content_hash = Some(input.content_hash.clone());
            m.last_sync_error = None;
            m.last_error_class = None;
            m.last_attempt_hash = None;
            m.last_sync_at = Some(now);
            m.retry_count = 0;
            m.updated_at = now;
            return Ok(m.clone());
        }

        let mirror = SyncMirror {
            id: state.next_id(),
            entity_type: entity.to_string(),
            internal_id: input.internal_id,
            natural_key: input.natural_key.clone(),
            external_id: Some(input.external_id.clone()),
            external_code: input.external_code.clone(),
            is_synced: true,
            content_hash: Some(input.content_hash.clone()),
            last_sync_error: None,
            last_error_class: None,
            last_attempt_hash: None,
            last_sync_at: Some(now),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.mirrors.push(mirror.clone());
        Ok(mirror)
    }

    async fn mark_failed(&self, input: &MirrorFailure) -> Result<SyncMirror, StoreError> {
        let mut state = self.state.lock().await;
        let now = state.tick();
        let entity = input.entity_type.as_str();
        let increment = RetryPolicy.retry_increment(input.error_class);
        if let Some(m) = state
            .mirrors
            .iter_mut()
            .find(|m| m.entity_type == entity && m.internal_id == input.internal_id)
        {
            m.natural_key = input.natural_key.clone();
            m.is_synced = false;
            m.last_sync_error = Some(input.error_message.clone());
            m.last_error_class = Some(input.error_class.as_str().to_string());
            m.last_attempt_hash = Some(input.attempt_hash.clone());
            m.retry_count += increment;
            m.updated_at = now;
            return Ok(m.clone());
        }

        let mirror = SyncMirror {
            id: state.next_id(),
            entity_type: entity.to_string(),
            internal_id: input.internal_id,
            natural_key: input.natural_key.clone(),
            external_id: None,
            external_code: None,
            is_synced: false,
            content_hash: None,
            last_sync_error: Some(input.error_message.clone()),
            last_error_class: Some(input.error_class.as_str().to_string()),
            last_attempt_hash: Some(input.attempt_hash.clone()),
            last_sync_at: None,
            retry_count: increment,
            created_at: now,
            updated_at: now,
        };
        state.mirrors.push(mirror.clone());
        Ok(mirror)
    }
}

#[async_trait]
impl MappingStore for MemoryStore {
    async fn active_mappings(&self) -> Result<Vec<MappingEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.mappings.iter().filter(|m| m.is_active).cloned().collect())
    }
}

#[async_trait]
impl InternalStore for MemoryStore {
    async fn customer_candidates(&self) -> Result<Vec<Customer>, StoreError> {
        let state = self.state.lock().await;
        state.check_available(EntityType::Customer)?;
        Ok(state
            .customers
            .iter()
            .filter(|c| c.is_active && state.needs_sync(EntityType::Customer, c.id, c.updated_at))
            .cloned()
            .collect())
    }

    async fn stock_candidates(&self) -> Result<Vec<StockMovement>, StoreError> {
        let state = self.state.lock().await;
        state.check_available(EntityType::Stock)?;
        Ok(state
            .movements
            .iter()
            .filter(|m| state.needs_sync(EntityType::Stock, m.id, m.updated_at))
            .cloned()
            .collect())
    }

    async fn invoice_candidates(&self) -> Result<Vec<Invoice>, StoreError> {
        let state = self.state.lock().await;
        state.check_available(EntityType::Invoice)?;
        Ok(state
            .invoices
            .iter()
            .filter(|i| state.needs_sync(EntityType::Invoice, i.id, i.updated_at))
            .cloned()
            .collect())
    }

    async fn order_candidates(&self, kind: OrderKind) -> Result<Vec<Order>, StoreError> {
        let entity = kind.entity_type();
        let state = self.state.lock().await;
        state.check_available(entity)?;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.kind == kind.as_str() && state.needs_sync(entity, o.id, o.updated_at))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AdjustmentStore for MemoryStore {
    async fn insert_adjustment_unless_open(
        &self,
        input: &NewPendingAdjustment,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        let mut state = self.state.lock().await;
        let open = AdjustmentStatus::open_statuses();
        if state.adjustments.iter().any(|a| {
            a.external_order_id == input.external_order_id
                && open.iter().any(|s| a.status == s.as_str())
        }) {
            return Ok(None);
        }
        let now = state.tick();
        let row = PendingStockAdjustment {
            id: state.next_id(),
            external_order_id: input.external_order_id.clone(),
            product_id: input.product_id,
            sku: input.sku.clone(),
            quantity_delta: input.quantity_delta,
            status: AdjustmentStatus::Pending.as_str().to_string(),
            requested_by: input.requested_by.clone(),
            requested_at: input.requested_at,
            decided_by: None,
            decided_at: None,
            reason: None,
            notes: input.notes.clone(),
            applied_at: None,
            created_at: now,
            updated_at: now,
        };
        state.adjustments.push(row.clone());
        Ok(Some(row))
    }

    async fn find_adjustment(
        &self,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.adjustments.iter().find(|a| a.id == id).cloned())
    }

    async fn find_open_adjustment(
        &self,
        external_order_id: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        let open = AdjustmentStatus::open_statuses();
        let state = self.state.lock().await;
        Ok(state
            .adjustments
            .iter()
            .find(|a| {
                a.external_order_id == external_order_id
                    && open.iter().any(|s| a.status == s.as_str())
            })
            .cloned())
    }

    async fn list_adjustments(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<PendingStockAdjustment>, StoreError> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let state = self.state.lock().await;
        let mut rows: Vec<PendingStockAdjustment> = state
            .adjustments
            .iter()
            .filter(|a| filter.status.map_or(true, |s| a.status == s.as_str()))
            .filter(|a| {
                filter
                    .external_order_id
                    .as_deref()
                    .map_or(true, |o| a.external_order_id == o)
            })
            .cloned()
            .collect();
        rows.sort_by_key(|a| (a.requested_at, a.id));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn approve_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        warehouse_code: &str,
    ) -> Result<Option<(PendingStockAdjustment, StockMovement)>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(adjustment) = state.transition(id, AdjustmentStatus::Pending, |a, now| {
            a.status = AdjustmentStatus::Approved.as_str().to_string();
            a.decided_by = Some(decided_by.to_string());
            a.decided_at = Some(now);
        }) else {
            return Ok(None);
        };
        let movement =
            state.insert_movement(&NewStockMovement::from_adjustment(&adjustment, warehouse_code));
        Ok(Some((adjustment, movement)))
    }

    async fn reject_adjustment(
        &self,
        id: DbId,
        decided_by: &str,
        reason: &str,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.transition(id, AdjustmentStatus::Pending, |a, now| {
            a.status = AdjustmentStatus::Rejected.as_str().to_string();
            a.decided_by = Some(decided_by.to_string());
            a.decided_at = Some(now);
            a.reason = Some(reason.to_string());
        }))
    }

    async fn mark_adjustment_applied(
        &self,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, StoreError> {
        let mut state = self.state.lock().await;
        Ok(state.transition(id, AdjustmentStatus::Approved, |a, now| {
            a.status = AdjustmentStatus::Applied.as_str().to_string();
            a.applied_at = Some(now);
        }))
    }

    async fn settleable_adjustment_ids(&self) -> Result<Vec<DbId>, StoreError> {
        let state = self.state.lock().await;
        let mut ids: Vec<DbId> = state
            .adjustments
            .iter()
            .filter(|a| a.status == AdjustmentStatus::Approved.as_str())
            .filter(|a| {
                state.movements.iter().any(|m| {
                    m.pending_adjustment_id == Some(a.id)
                        && state
                            .mirror(EntityType::Stock, m.id)
                            .is_some_and(|mirror| mirror.is_synced)
                })
            })
            .map(|a| a.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}
