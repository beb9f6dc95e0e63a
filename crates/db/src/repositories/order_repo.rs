//! Repository for the `orders` table (purchase and sales).

use sqlx::types::Json;
use sqlx::PgPool;

use super::NEEDS_SYNC_PREDICATE;
use crate::models::order::{CreateOrder, Order, OrderKind};

const COLUMNS: &str = "\
    id, kind, order_number, counterparty_code, ordered_at, warehouse_code, currency, \
    lines, created_at, updated_at";

const ALIASED_COLUMNS: &str = "\
    e.id, e.kind, e.order_number, e.counterparty_code, e.ordered_at, e.warehouse_code, \
    e.currency, e.lines, e.created_at, e.updated_at";

pub struct OrderRepo;

impl OrderRepo {
    pub async fn create(pool: &PgPool, input: &CreateOrder) -> Result<Order, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders \
                (kind, order_number, counterparty_code, ordered_at, warehouse_code, currency, lines) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(input.kind.as_str())
            .bind(&input.order_number)
            .bind(&input.counterparty_code)
            .bind(input.ordered_at)
            .bind(&input.warehouse_code)
            .bind(&input.currency)
            .bind(Json(&input.lines))
            .fetch_one(pool)
            .await
    }

    /// Orders of one kind that need a sync attempt.
    pub async fn list_sync_candidates(
        pool: &PgPool,
        kind: OrderKind,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {ALIASED_COLUMNS} FROM orders e \
             LEFT JOIN sync_mirrors m ON m.entity_type = $1 AND m.internal_id = e.id \
             WHERE e.kind = $2 AND {NEEDS_SYNC_PREDICATE} \
             ORDER BY e.id"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(kind.entity_type().as_str())
            .bind(kind.as_str())
            .fetch_all(pool)
            .await
    }
}
