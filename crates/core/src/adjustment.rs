//! Pending stock adjustment state machine and notification validation.
//!
//! Externally-sourced stock changes are held behind a human approval gate:
//!
//! - `pending`  -> `approved`, `rejected`
//! - `approved` -> `applied`
//! - `rejected`, `applied` are terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Warehouse used for movements created by approval when the
/// notification does not name one.
pub const DEFAULT_WAREHOUSE_CODE: &str = "MAIN";

/// `requested_by` value for adjustments created from the webhook source.
pub const DEFAULT_REQUESTED_BY: &str = "webhook";

// ---------------------------------------------------------------------------
// AdjustmentStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentStatus {
    Pending,
    Approved,
    Rejected,
    Applied,
}

impl AdjustmentStatus {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Pending => "pending",
            AdjustmentStatus::Approved => "approved",
            AdjustmentStatus::Rejected => "rejected",
            AdjustmentStatus::Applied => "applied",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(AdjustmentStatus::Pending),
            "approved" => Ok(AdjustmentStatus::Approved),
            "rejected" => Ok(AdjustmentStatus::Rejected),
            "applied" => Ok(AdjustmentStatus::Applied),
            other => Err(CoreError::Validation(format!(
                "Unknown adjustment status '{other}'"
            ))),
        }
    }

    /// Statuses reachable from `self`.
    pub fn valid_transitions(&self) -> &'static [AdjustmentStatus] {
        match self {
            AdjustmentStatus::Pending => &[AdjustmentStatus::Approved, AdjustmentStatus::Rejected],
            AdjustmentStatus::Approved => &[AdjustmentStatus::Applied],
            AdjustmentStatus::Rejected | AdjustmentStatus::Applied => &[],
        }
    }

    pub fn can_transition_to(&self, next: AdjustmentStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }

    /// Non-terminal statuses; an open adjustment blocks re-ingestion of its order id.
    pub fn open_statuses() -> [AdjustmentStatus; 2] {
        [AdjustmentStatus::Pending, AdjustmentStatus::Approved]
    }
}

impl fmt::Display for AdjustmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a transition, producing the `Conflict` error operators see
/// when they double-approve or approve after rejection.
pub fn validate_transition(
    id: i64,
    current: AdjustmentStatus,
    next: AdjustmentStatus,
) -> Result<(), CoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!(
            "Adjustment {id} is '{current}' and cannot move to '{next}'"
        )))
    }
}

// ---------------------------------------------------------------------------
// Movement type
// ---------------------------------------------------------------------------

/// Direction of the internal stock movement created on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "in" => Ok(MovementType::In),
            "out" => Ok(MovementType::Out),
            "adjustment" => Ok(MovementType::Adjustment),
            other => Err(CoreError::Validation(format!(
                "Unknown movement type '{other}'"
            ))),
        }
    }

    /// Positive deltas receive stock, negative deltas issue it.
    pub fn from_delta(quantity_delta: i32) -> Self {
        match quantity_delta.signum() {
            1 => MovementType::In,
            -1 => MovementType::Out,
            _ => MovementType::Adjustment,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A stock-change notification as delivered by the webhook source.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StockChangeNotification {
    #[validate(length(min = 1, max = 100, message = "External order id must be 1-100 characters"))]
    pub external_order_id: String,
    #[validate(range(min = 1, message = "Product id must be positive"))]
    pub product_id: i64,
    #[validate(length(max = 100, message = "SKU cannot exceed 100 characters"))]
    pub sku: Option<String>,
    /// Negative decreases stock.
    pub quantity_delta: i32,
    pub timestamp: Option<DateTime<Utc>>,
    /// Source event name, e.g. `stock.updated`.
    pub event: Option<String>,
    #[serde(default)]
    pub authenticity_token: Option<String>,
}

/// Values for a new `pending` adjustment row derived from a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPendingAdjustment {
    pub external_order_id: String,
    pub product_id: i64,
    pub sku: String,
    pub quantity_delta: i32,
    pub requested_by: String,
    pub requested_at: Timestamp,
    pub notes: Option<String>,
}

/// Fallback SKU when the notification carries none.
pub fn fallback_sku(product_id: i64) -> String {
    format!("PRODUCT-{product_id}")
}

impl StockChangeNotification {
    /// Validate field constraints and derive the row to insert.
    ///
    /// A zero delta is rejected: it would create an approval task that
    /// changes nothing.
    pub fn prepare(
        &self,
        requested_by: &str,
        received_at: Timestamp,
    ) -> Result<NewPendingAdjustment, CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        if self.external_order_id.trim().is_empty() {
            return Err(CoreError::Validation(
                "External order id must not be blank".to_string(),
            ));
        }
        if self.quantity_delta == 0 {
            return Err(CoreError::Validation(
                "Quantity delta must not be zero".to_string(),
            ));
        }

        let sku = self
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback_sku(self.product_id));

        Ok(NewPendingAdjustment {
            external_order_id: self.external_order_id.trim().to_string(),
            product_id: self.product_id,
            sku,
            quantity_delta: self.quantity_delta,
            requested_by: requested_by.to_string(),
            requested_at: self.timestamp.unwrap_or(received_at),
            notes: self
                .event
                .as_deref()
                .filter(|e| !e.is_empty())
                .map(|e| format!("webhook event: {e}")),
        })
    }
}
