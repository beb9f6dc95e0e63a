//! Line items shared by invoices and orders, stored as JSONB.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLine {
    pub sku: String,
    pub quantity: f64,
    pub unit_code: Option<String>,
    /// Unit price in minor currency units (kuruş, cents).
    pub unit_price_minor: i64,
    pub tax_rate_percent: i32,
}
