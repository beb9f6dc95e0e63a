//! Repository for the `stock_movements` table.

use erpsync_core::entity::EntityType;
use erpsync_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use super::NEEDS_SYNC_PREDICATE;
use crate::models::stock_movement::{NewStockMovement, StockMovement};

const COLUMNS: &str = "\
    id, sku, product_id, warehouse_code, unit_code, quantity_delta, movement_type, \
    source_document, pending_adjustment_id, occurred_at, created_at, updated_at";

const ALIASED_COLUMNS: &str = "\
    e.id, e.sku, e.product_id, e.warehouse_code, e.unit_code, e.quantity_delta, \
    e.movement_type, e.source_document, e.pending_adjustment_id, e.occurred_at, \
    e.created_at, e.updated_at";

pub struct StockMovementRepo;

impl StockMovementRepo {
    /// Insert a movement on a pool or inside a caller's transaction.
    pub async fn insert<'e, E>(
        executor: E,
        input: &NewStockMovement,
    ) -> Result<StockMovement, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO stock_movements \
                (sku, product_id, warehouse_code, unit_code, quantity_delta, movement_type, \
                 source_document, pending_adjustment_id, occurred_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StockMovement>(&query)
            .bind(&input.sku)
            .bind(input.product_id)
            .bind(&input.warehouse_code)
            .bind(&input.unit_code)
            .bind(input.quantity_delta)
            .bind(input.movement_type.as_str())
            .bind(&input.source_document)
            .bind(input.pending_adjustment_id)
            .bind(input.occurred_at)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StockMovement>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM stock_movements WHERE id = $1");
        sqlx::query_as::<_, StockMovement>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_adjustment(
        pool: &PgPool,
        adjustment_id: DbId,
    ) -> Result<Option<StockMovement>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM stock_movements WHERE pending_adjustment_id = $1");
        sqlx::query_as::<_, StockMovement>(&query)
            .bind(adjustment_id)
            .fetch_optional(pool)
            .await
    }

    /// Movements that need a sync attempt.
    pub async fn list_sync_candidates(pool: &PgPool) -> Result<Vec<StockMovement>, sqlx::Error> {
        let query = format!(
            "SELECT {ALIASED_COLUMNS} FROM stock_movements e \
             LEFT JOIN sync_mirrors m ON m.entity_type = $1 AND m.internal_id = e.id \
             WHERE {NEEDS_SYNC_PREDICATE} \
             ORDER BY e.id"
        );
        sqlx::query_as::<_, StockMovement>(&query)
            .bind(EntityType::Stock.as_str())
            .fetch_all(pool)
            .await
    }
}
