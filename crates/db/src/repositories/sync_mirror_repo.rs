//! Repository for the `sync_mirrors` table.

use erpsync_core::entity::EntityType;
use erpsync_core::retry::RetryPolicy;
use erpsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::sync_mirror::{MirrorFailure, MirrorSuccess, SyncMirror};

const COLUMNS: &str = "\
    id, entity_type, internal_id, natural_key, external_id, external_code, \
    is_synced, content_hash, last_sync_error, last_error_class, last_attempt_hash, \
    last_sync_at, retry_count, created_at, updated_at";

pub struct SyncMirrorRepo;

impl SyncMirrorRepo {
    pub async fn find(
        pool: &PgPool,
        entity: EntityType,
        internal_id: DbId,
    ) -> Result<Option<SyncMirror>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sync_mirrors WHERE entity_type = $1 AND internal_id = $2"
        );
        sqlx::query_as::<_, SyncMirror>(&query)
            .bind(entity.as_str())
            .bind(internal_id)
            .fetch_optional(pool)
            .await
    }

    /// Best mirror for a natural key: one carrying an external id wins,
    /// then synced over unsynced, then the most recently touched.
    pub async fn find_by_natural_key(
        pool: &PgPool,
        entity: EntityType,
        natural_key: &str,
    ) -> Result<Option<SyncMirror>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sync_mirrors \
             WHERE entity_type = $1 AND natural_key = $2 \
             ORDER BY (external_id IS NULL), is_synced DESC, updated_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, SyncMirror>(&query)
            .bind(entity.as_str())
            .bind(natural_key)
            .fetch_optional(pool)
            .await
    }

    /// Record a successful sync; clears error state and resets `retry_count`.
    pub async fn upsert_success(
        pool: &PgPool,
        input: &MirrorSuccess,
    ) -> Result<SyncMirror, sqlx::Error> {
        let query = format!(
            "INSERT INTO sync_mirrors \
                (entity_type, internal_id, natural_key, external_id, external_code, \
                 is_synced, content_hash, last_sync_at, retry_count) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, NOW(), 0) \
             ON CONFLICT (entity_type, internal_id) DO UPDATE SET \
                natural_key = EXCLUDED.natural_key, \
                external_id = EXCLUDED.external_id, \
                external_code = COALESCE(EXCLUDED.external_code, sync_mirrors.external_code), \
                is_synced = TRUE, \
                content_hash = EXCLUDED.content_hash, \
                last_sync_error = NULL, \
                last_error_class = NULL, \
                last_attempt_hash = NULL, \
                last_sync_at = NOW(), \
                retry_count = 0 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncMirror>(&query)
            .bind(input.entity_type.as_str())
            .bind(input.internal_id)
            .bind(&input.natural_key)
            .bind(&input.external_id)
            .bind(&input.external_code)
            .bind(&input.content_hash)
            .fetch_one(pool)
            .await
    }

    /// Record a failed attempt. The external id, if any, is kept so the
    /// next attempt updates rather than creates. `retry_count` grows only
    /// for classes that count toward retry.
    pub async fn upsert_failure(
        pool: &PgPool,
        input: &MirrorFailure,
    ) -> Result<SyncMirror, sqlx::Error> {
        let increment = RetryPolicy.retry_increment(input.error_class);
        let query = format!(
            "INSERT INTO sync_mirrors \
                (entity_type, internal_id, natural_key, is_synced, last_sync_error, \
                 last_error_class, last_attempt_hash, retry_count) \
             VALUES ($1, $2, $3, FALSE, $4, $5, $6, $7) \
             ON CONFLICT (entity_type, internal_id) DO UPDATE SET \
                natural_key = EXCLUDED.natural_key, \
                is_synced = FALSE, \
                last_sync_error = EXCLUDED.last_sync_error, \
                last_error_class = EXCLUDED.last_error_class, \
                last_attempt_hash = EXCLUDED.last_attempt_hash, \
                retry_count = sync_mirrors.retry_count + $7 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncMirror>(&query)
            .bind(input.entity_type.as_str())
            .bind(input.internal_id)
            .bind(&input.natural_key)
            .bind(&input.error_message)
            .bind(input.error_class.as_str())
            .bind(&input.attempt_hash)
            .bind(increment)
            .fetch_one(pool)
            .await
    }
}
