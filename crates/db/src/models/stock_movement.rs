//! Internal stock movements.

use erpsync_core::adjustment::MovementType;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::pending_adjustment::PendingStockAdjustment;

/// A row from the `stock_movements` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: DbId,
    pub sku: String,
    pub product_id: Option<DbId>,
    pub warehouse_code: String,
    pub unit_code: Option<String>,
    pub quantity_delta: i32,
    pub movement_type: String,
    pub source_document: Option<String>,
    pub pending_adjustment_id: Option<DbId>,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub sku: String,
    pub product_id: Option<DbId>,
    pub warehouse_code: String,
    pub unit_code: Option<String>,
    pub quantity_delta: i32,
    pub movement_type: MovementType,
    pub source_document: Option<String>,
    pub pending_adjustment_id: Option<DbId>,
    pub occurred_at: Timestamp,
}

impl NewStockMovement {
    /// The movement materialised by approving an adjustment.
    pub fn from_adjustment(adjustment: &PendingStockAdjustment, warehouse_code: &str) -> Self {
        Self {
            sku: adjustment.sku.clone(),
            product_id: Some(adjustment.product_id),
            warehouse_code: warehouse_code.to_string(),
            unit_code: None,
            quantity_delta: adjustment.quantity_delta,
            movement_type: MovementType::from_delta(adjustment.quantity_delta),
            source_document: Some(adjustment.external_order_id.clone()),
            pending_adjustment_id: Some(adjustment.id),
            occurred_at: adjustment.decided_at.unwrap_or(adjustment.requested_at),
        }
    }
}
