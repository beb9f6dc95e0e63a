//! Repository for the `failed_sync_records` table.

use erpsync_core::entity::EntityType;
use erpsync_core::retry::ErrorClass;
use erpsync_core::sync_status::FailedRecordStatus;
use erpsync_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::failed_sync_record::{
    page_bounds, FailedRecordFilter, FailedSyncRecord, NewFailedSyncRecord,
};

const COLUMNS: &str = "\
    id, run_id, record_type, record_id, natural_key, error_class, error_message, \
    original_payload, failed_at, status, retry_count, last_retry_at, resolved_at";

pub struct FailedSyncRecordRepo;

impl FailedSyncRecordRepo {
    pub async fn insert(
        pool: &PgPool,
        input: &NewFailedSyncRecord,
    ) -> Result<FailedSyncRecord, sqlx::Error> {
        let query = format!(
            "INSERT INTO failed_sync_records \
                (run_id, record_type, record_id, natural_key, error_class, error_message, original_payload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FailedSyncRecord>(&query)
            .bind(input.run_id)
            .bind(input.record_type.as_str())
            .bind(input.record_id)
            .bind(&input.natural_key)
            .bind(input.error_class.as_str())
            .bind(&input.error_message)
            .bind(&input.original_payload)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<FailedSyncRecord>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM failed_sync_records WHERE id = $1");
        sqlx::query_as::<_, FailedSyncRecord>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List failed records newest-first. Unset filter fields match everything.
    pub async fn list(
        pool: &PgPool,
        filter: &FailedRecordFilter,
    ) -> Result<Vec<FailedSyncRecord>, sqlx::Error> {
        let (limit, offset) = page_bounds(filter.limit, filter.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM failed_sync_records \
             WHERE ($1::TEXT IS NULL OR record_type = $1) \
               AND ($2::TEXT IS NULL OR status = $2) \
               AND ($3::TEXT IS NULL OR error_class = $3) \
             ORDER BY failed_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, FailedSyncRecord>(&query)
            .bind(filter.record_type.map(|e| e.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.error_class.map(|c| c.as_str()))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Mark a record resolved after a successful replay.
    pub async fn mark_resolved(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<FailedSyncRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE failed_sync_records \
             SET status = $2, resolved_at = NOW(), \
                 retry_count = retry_count + 1, last_retry_at = NOW() \
             WHERE id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FailedSyncRecord>(&query)
            .bind(id)
            .bind(FailedRecordStatus::Resolved.as_str())
            .bind(FailedRecordStatus::Failed.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Record a failed replay attempt; the record stays `failed`.
    pub async fn mark_retry_failed(
        pool: &PgPool,
        id: DbId,
        error_class: ErrorClass,
        error_message: &str,
    ) -> Result<Option<FailedSyncRecord>, sqlx::Error> {
        let query = format!(
            "UPDATE failed_sync_records \
             SET error_class = $2, error_message = $3, \
                 retry_count = retry_count + 1, last_retry_at = NOW() \
             WHERE id = $1 AND status = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, FailedSyncRecord>(&query)
            .bind(id)
            .bind(error_class.as_str())
            .bind(error_message)
            .bind(FailedRecordStatus::Failed.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Resolve every open failure of one internal record, e.g. after a
    /// scheduled run synced it.
    pub async fn resolve_for_record(
        pool: &PgPool,
        record_type: EntityType,
        record_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE failed_sync_records SET status = $3, resolved_at = NOW() \
             WHERE record_type = $1 AND record_id = $2 AND status = $4",
        )
        .bind(record_type.as_str())
        .bind(record_id)
        .bind(FailedRecordStatus::Resolved.as_str())
        .bind(FailedRecordStatus::Failed.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete resolved records older than `cutoff`. Open failures are kept.
    pub async fn purge_resolved_before(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM failed_sync_records WHERE status = $1 AND resolved_at < $2",
        )
        .bind(FailedRecordStatus::Resolved.as_str())
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
