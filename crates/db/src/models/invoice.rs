//! Invoice records.

use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::document_line::DocumentLine;

/// A row from the `invoices` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Invoice {
    pub id: DbId,
    pub invoice_number: String,
    pub customer_code: String,
    pub issued_at: Timestamp,
    pub currency: String,
    pub warehouse_code: Option<String>,
    pub lines: Json<Vec<DocumentLine>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoice {
    pub invoice_number: String,
    pub customer_code: String,
    pub issued_at: Timestamp,
    pub currency: String,
    pub warehouse_code: Option<String>,
    pub lines: Vec<DocumentLine>,
}
