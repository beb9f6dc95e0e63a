//! Pending stock adjustment model and DTOs.

use erpsync_core::adjustment::AdjustmentStatus;
use erpsync_core::error::CoreError;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `pending_stock_adjustments` table. Rows are never
/// deleted; the status column carries the approval audit trail.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct PendingStockAdjustment {
    pub id: DbId,
    pub external_order_id: String,
    pub product_id: DbId,
    pub sku: String,
    pub quantity_delta: i32,
    pub status: String,
    pub requested_by: String,
    pub requested_at: Timestamp,
    pub decided_by: Option<String>,
    pub decided_at: Option<Timestamp>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub applied_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PendingStockAdjustment {
    pub fn adjustment_status(&self) -> Result<AdjustmentStatus, CoreError> {
        AdjustmentStatus::parse(&self.status)
    }
}

/// Query parameters for listing adjustments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdjustmentFilter {
    pub status: Option<AdjustmentStatus>,
    pub external_order_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
