//! Approval-gated ingestion of externally-sourced stock changes.
//!
//! `receive` authenticates, validates and stores a notification as a
//! `pending` adjustment, ignoring re-deliveries of an order id that is
//! still open. Operators then `approve` (which creates the internal stock
//! movement picked up by the stock job) or `reject`. Every decision is a
//! compare-and-set in the store: when it loses, the current row is read
//! back to report a `Conflict` or `NotFound`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use erpsync_core::adjustment::{validate_transition, AdjustmentStatus, StockChangeNotification};
use erpsync_core::error::CoreError;
use erpsync_core::signature;
use erpsync_core::types::DbId;
use erpsync_db::models::pending_adjustment::{AdjustmentFilter, PendingStockAdjustment};
use erpsync_db::models::stock_movement::StockMovement;
use erpsync_events::{event_types, EventBus, SyncEvent};

use crate::error::{bounded, SyncError};
use crate::settings::WebhookSettings;
use crate::store::SyncStore;

/// Result of ingesting one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    Created(PendingStockAdjustment),
    /// An open adjustment already exists for the order id; nothing was written.
    Duplicate { existing_id: Option<DbId> },
}

pub struct PendingAdjustmentWorkflow {
    store: Arc<dyn SyncStore>,
    settings: WebhookSettings,
    events: Arc<EventBus>,
    store_timeout: Duration,
}

impl PendingAdjustmentWorkflow {
    pub fn new(
        store: Arc<dyn SyncStore>,
        settings: WebhookSettings,
        events: Arc<EventBus>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            settings,
            events,
            store_timeout,
        }
    }

    /// Ingest a notification.
    ///
    /// The authenticity check runs first, so an unauthorized request never
    /// reaches validation or the store.
    pub async fn receive(
        &self,
        notification: &StockChangeNotification,
    ) -> Result<ReceiveOutcome, SyncError> {
        if let Err(e) = signature::verify(
            self.settings.auth_mode,
            self.settings.secret.as_deref(),
            notification,
        ) {
            tracing::warn!(
                external_order_id = %notification.external_order_id,
                error = %e,
                "Rejected stock-change notification",
            );
            return Err(e.into());
        }

        let input = notification.prepare(&self.settings.requested_by, Utc::now())?;
        let inserted = bounded(
            "insert_adjustment_unless_open",
            self.store_timeout,
            self.store.insert_adjustment_unless_open(&input),
        )
        .await?;

        let Some(adjustment) = inserted else {
            let existing = bounded(
                "find_open_adjustment",
                self.store_timeout,
                self.store.find_open_adjustment(&input.external_order_id),
            )
            .await?;
            tracing::info!(
                external_order_id = %input.external_order_id,
                existing_id = existing.as_ref().map(|a| a.id),
                "Duplicate stock-change notification ignored",
            );
            return Ok(ReceiveOutcome::Duplicate {
                existing_id: existing.map(|a| a.id),
            });
        };

        tracing::info!(
            adjustment_id = adjustment.id,
            external_order_id = %adjustment.external_order_id,
            quantity_delta = adjustment.quantity_delta,
            "Pending stock adjustment received",
        );
        self.events.publish(
            SyncEvent::new(event_types::ADJUSTMENT_RECEIVED)
                .with_subject("pending_adjustment", adjustment.id)
                .with_actor(adjustment.requested_by.clone())
                .with_payload(serde_json::json!({
                    "external_order_id": adjustment.external_order_id,
                    "sku": adjustment.sku,
                    "quantity_delta": adjustment.quantity_delta,
                })),
        );
        Ok(ReceiveOutcome::Created(adjustment))
    }

    /// List adjustments. Without a status filter only `pending` rows are returned.
    pub async fn list_pending(
        &self,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<PendingStockAdjustment>, SyncError> {
        let filter = AdjustmentFilter {
            status: Some(filter.status.unwrap_or(AdjustmentStatus::Pending)),
            ..filter.clone()
        };
        Ok(bounded(
            "list_adjustments",
            self.store_timeout,
            self.store.list_adjustments(&filter),
        )
        .await?)
    }

    /// `pending -> approved`, creating the linked stock movement.
    pub async fn approve(
        &self,
        id: DbId,
        decided_by: &str,
    ) -> Result<(PendingStockAdjustment, StockMovement), SyncError> {
        let decided_by = require_actor(decided_by)?;
        let approved = bounded(
            "approve_adjustment",
            self.store_timeout,
            self.store
                .approve_adjustment(id, decided_by, &self.settings.default_warehouse),
        )
        .await?;

        let Some((adjustment, movement)) = approved else {
            return Err(self.explain_lost_transition(id, AdjustmentStatus::Approved).await);
        };

        tracing::info!(
            adjustment_id = adjustment.id,
            movement_id = movement.id,
            decided_by,
            "Pending stock adjustment approved",
        );
        self.events.publish(
            SyncEvent::new(event_types::ADJUSTMENT_APPROVED)
                .with_subject("pending_adjustment", adjustment.id)
                .with_actor(decided_by)
                .with_payload(serde_json::json!({
                    "external_order_id": adjustment.external_order_id,
                    "movement_id": movement.id,
                    "warehouse_code": movement.warehouse_code,
                    "quantity_delta": adjustment.quantity_delta,
                })),
        );
        Ok((adjustment, movement))
    }

    /// `pending -> rejected`. A reason is required for the audit trail.
    pub async fn reject(
        &self,
        id: DbId,
        decided_by: &str,
        reason: &str,
    ) -> Result<PendingStockAdjustment, SyncError> {
        let decided_by = require_actor(decided_by)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CoreError::Validation("A rejection reason is required".to_string()).into());
        }

        let rejected = bounded(
            "reject_adjustment",
            self.store_timeout,
            self.store.reject_adjustment(id, decided_by, reason),
        )
        .await?;

        let Some(adjustment) = rejected else {
            return Err(self.explain_lost_transition(id, AdjustmentStatus::Rejected).await);
        };

        tracing::info!(adjustment_id = adjustment.id, decided_by, "Pending stock adjustment rejected");
        self.events.publish(
            SyncEvent::new(event_types::ADJUSTMENT_REJECTED)
                .with_subject("pending_adjustment", adjustment.id)
                .with_actor(decided_by)
                .with_payload(serde_json::json!({
                    "external_order_id": adjustment.external_order_id,
                    "reason": reason,
                })),
        );
        Ok(adjustment)
    }

    /// Turn a failed compare-and-set into `NotFound` or `Conflict`.
    async fn explain_lost_transition(&self, id: DbId, next: AdjustmentStatus) -> SyncError {
        let current = match bounded(
            "find_adjustment",
            self.store_timeout,
            self.store.find_adjustment(id),
        )
        .await
        {
            Ok(Some(row)) => row,
            Ok(None) => {
                return CoreError::NotFound {
                    entity: "pending_adjustment",
                    id,
                }
                .into()
            }
            Err(e) => return e.into(),
        };
        let status = match current.adjustment_status() {
            Ok(status) => status,
            Err(e) => return e.into(),
        };
        match validate_transition(id, status, next) {
            Err(e) => e.into(),
            // Still pending after a lost compare-and-set: a concurrent
            // decision was rolled back in between.
            Ok(()) => CoreError::Conflict(format!(
                "Adjustment {id} changed concurrently, retry the decision"
            ))
            .into(),
        }
    }
}

fn require_actor(decided_by: &str) -> Result<&str, CoreError> {
    let decided_by = decided_by.trim();
    if decided_by.is_empty() {
        Err(CoreError::Validation("Deciding user is required".to_string()))
    } else {
        Ok(decided_by)
    }
}
