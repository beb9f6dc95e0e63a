//! Repository for the `pending_stock_adjustments` table.
//!
//! Every status change is a single conditional `UPDATE ... WHERE status = $n`
//! so concurrent decisions on one row cannot both succeed.

use erpsync_core::adjustment::{AdjustmentStatus, NewPendingAdjustment};
use erpsync_core::entity::EntityType;
use erpsync_core::types::DbId;
use sqlx::PgPool;

use super::stock_movement_repo::StockMovementRepo;
use crate::models::failed_sync_record::page_bounds;
use crate::models::pending_adjustment::{AdjustmentFilter, PendingStockAdjustment};
use crate::models::stock_movement::{NewStockMovement, StockMovement};

const COLUMNS: &str = "\
    id, external_order_id, product_id, sku, quantity_delta, status, \
    requested_by, requested_at, decided_by, decided_at, reason, notes, \
    applied_at, created_at, updated_at";

pub struct PendingAdjustmentRepo;

impl PendingAdjustmentRepo {
    /// Insert a `pending` row unless an open (pending or approved) row
    /// already exists for the same external order id.
    ///
    /// Returns `None` for a duplicate delivery. Relies on the partial
    /// unique index over open rows, so concurrent duplicates are safe.
    pub async fn insert_unless_open(
        pool: &PgPool,
        input: &NewPendingAdjustment,
    ) -> Result<Option<PendingStockAdjustment>, sqlx::Error> {
        let query = format!(
            "INSERT INTO pending_stock_adjustments \
                (external_order_id, product_id, sku, quantity_delta, status, \
                 requested_by, requested_at, notes) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (external_order_id) WHERE status IN ('pending', 'approved') \
             DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(&input.external_order_id)
            .bind(input.product_id)
            .bind(&input.sku)
            .bind(input.quantity_delta)
            .bind(AdjustmentStatus::Pending.as_str())
            .bind(&input.requested_by)
            .bind(input.requested_at)
            .bind(&input.notes)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_stock_adjustments WHERE id = $1");
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The open adjustment for an external order id, if any.
    pub async fn find_open_by_order(
        pool: &PgPool,
        external_order_id: &str,
    ) -> Result<Option<PendingStockAdjustment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_stock_adjustments \
             WHERE external_order_id = $1 AND status IN ('pending', 'approved')"
        );
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(external_order_id)
            .fetch_optional(pool)
            .await
    }

    /// List adjustments oldest-first.
    pub async fn list(
        pool: &PgPool,
        filter: &AdjustmentFilter,
    ) -> Result<Vec<PendingStockAdjustment>, sqlx::Error> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM pending_stock_adjustments \
             WHERE ($1::TEXT IS NULL OR status = $1) \
               AND ($2::TEXT IS NULL OR external_order_id = $2) \
             ORDER BY requested_at ASC, id ASC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(&filter.external_order_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// `pending -> rejected`. `None` when the row is not pending.
    pub async fn reject(
        pool: &PgPool,
        id: DbId,
        decided_by: &str,
        reason: &str,
    ) -> Result<Option<PendingStockAdjustment>, sqlx::Error> {
        let query = format!(
            "UPDATE pending_stock_adjustments \
             SET status = $2, decided_by = $3, decided_at = NOW(), reason = $4 \
             WHERE id = $1 AND status = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(id)
            .bind(AdjustmentStatus::Rejected.as_str())
            .bind(decided_by)
            .bind(reason)
            .bind(AdjustmentStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// `pending -> approved`, inserting the internal stock movement in the
    /// same transaction. `None` when the row is not pending.
    pub async fn approve(
        pool: &PgPool,
        id: DbId,
        decided_by: &str,
        warehouse_code: &str,
    ) -> Result<Option<(PendingStockAdjustment, StockMovement)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "UPDATE pending_stock_adjustments \
             SET status = $2, decided_by = $3, decided_at = NOW() \
             WHERE id = $1 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        let adjustment = sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(id)
            .bind(AdjustmentStatus::Approved.as_str())
            .bind(decided_by)
            .bind(AdjustmentStatus::Pending.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(adjustment) = adjustment else {
            tx.rollback().await?;
            return Ok(None);
        };

        let input = NewStockMovement::from_adjustment(&adjustment, warehouse_code);
        let movement = StockMovementRepo::insert(&mut *tx, &input).await?;

        tx.commit().await?;
        Ok(Some((adjustment, movement)))
    }

    /// `approved -> applied`. `None` when the row is not approved.
    pub async fn mark_applied(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<PendingStockAdjustment>, sqlx::Error> {
        let query = format!(
            "UPDATE pending_stock_adjustments \
             SET status = $2, applied_at = NOW() \
             WHERE id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingStockAdjustment>(&query)
            .bind(id)
            .bind(AdjustmentStatus::Applied.as_str())
            .bind(AdjustmentStatus::Approved.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Approved adjustments whose stock movement is already synced but
    /// which were never marked applied (e.g. the process stopped between
    /// the external call and the status update).
    pub async fn list_settleable_ids(pool: &PgPool) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT a.id FROM pending_stock_adjustments a \
             JOIN stock_movements s ON s.pending_adjustment_id = a.id \
             JOIN sync_mirrors m ON m.entity_type = $1 AND m.internal_id = s.id \
             WHERE a.status = $2 AND m.is_synced \
             ORDER BY a.id",
        )
        .bind(EntityType::Stock.as_str())
        .bind(AdjustmentStatus::Approved.as_str())
        .fetch_all(pool)
        .await
    }
}
