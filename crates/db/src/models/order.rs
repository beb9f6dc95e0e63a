//! Purchase and sales orders, discriminated by `kind`.

use std::fmt;

use erpsync_core::entity::EntityType;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::document_line::DocumentLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Purchase,
    Sales,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "purchase",
            OrderKind::Sales => "sales",
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            OrderKind::Purchase => EntityType::PurchaseOrder,
            OrderKind::Sales => EntityType::SalesOrder,
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row from the `orders` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: DbId,
    pub kind: String,
    pub order_number: String,
    pub counterparty_code: String,
    pub ordered_at: Timestamp,
    pub warehouse_code: String,
    pub currency: String,
    pub lines: Json<Vec<DocumentLine>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub kind: OrderKind,
    pub order_number: String,
    pub counterparty_code: String,
    pub ordered_at: Timestamp,
    pub warehouse_code: String,
    pub currency: String,
    pub lines: Vec<DocumentLine>,
}
