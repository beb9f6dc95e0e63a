//! Repository for the `invoices` table.

use erpsync_core::entity::EntityType;
use sqlx::types::Json;
use sqlx::PgPool;

use super::NEEDS_SYNC_PREDICATE;
use crate::models::invoice::{CreateInvoice, Invoice};

const COLUMNS: &str = "\
    id, invoice_number, customer_code, issued_at, currency, warehouse_code, lines, \
    created_at, updated_at";

const ALIASED_COLUMNS: &str = "\
    e.id, e.invoice_number, e.customer_code, e.issued_at, e.currency, e.warehouse_code, \
    e.lines, e.created_at, e.updated_at";

pub struct InvoiceRepo;

impl InvoiceRepo {
    pub async fn create(pool: &PgPool, input: &CreateInvoice) -> Result<Invoice, sqlx::Error> {
        let query = format!(
            "INSERT INTO invoices \
                (invoice_number, customer_code, issued_at, currency, warehouse_code, lines) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Invoice>(&query)
            .bind(&input.invoice_number)
            .bind(&input.customer_code)
            .bind(input.issued_at)
            .bind(&input.currency)
            .bind(&input.warehouse_code)
            .bind(Json(&input.lines))
            .fetch_one(pool)
            .await
    }

    pub async fn list_sync_candidates(pool: &PgPool) -> Result<Vec<Invoice>, sqlx::Error> {
        let query = format!(
            "SELECT {ALIASED_COLUMNS} FROM invoices e \
             LEFT JOIN sync_mirrors m ON m.entity_type = $1 AND m.internal_id = e.id \
             WHERE {NEEDS_SYNC_PREDICATE} \
             ORDER BY e.id"
        );
        sqlx::query_as::<_, Invoice>(&query)
            .bind(EntityType::Invoice.as_str())
            .fetch_all(pool)
            .await
    }
}
