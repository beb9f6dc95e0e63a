//! Repository for the `sync_runs` table.

use erpsync_core::entity::EntityType;
use erpsync_core::sync_status::SyncRunStatus;
use erpsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::sync_run::{CloseSyncRun, SyncRun};

const COLUMNS: &str = "\
    id, entity_type, status, started_at, ended_at, \
    success_count, failure_count, skipped_count, note";

pub struct SyncRunRepo;

impl SyncRunRepo {
    /// Open a new run in `running` state.
    pub async fn open(pool: &PgPool, entity: EntityType) -> Result<SyncRun, sqlx::Error> {
        let query = format!(
            "INSERT INTO sync_runs (entity_type, status) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncRun>(&query)
            .bind(entity.as_str())
            .bind(SyncRunStatus::Running.as_str())
            .fetch_one(pool)
            .await
    }

    /// Close a running run. Returns `None` when the run is unknown or was
    /// already closed; closed runs are never rewritten.
    pub async fn close(
        pool: &PgPool,
        run_id: DbId,
        input: &CloseSyncRun,
    ) -> Result<Option<SyncRun>, sqlx::Error> {
        let query = format!(
            "UPDATE sync_runs \
             SET status = $2, ended_at = NOW(), success_count = $3, \
                 failure_count = $4, skipped_count = $5, note = $6 \
             WHERE id = $1 AND status = $7 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SyncRun>(&query)
            .bind(run_id)
            .bind(input.status.as_str())
            .bind(input.success_count)
            .bind(input.failure_count)
            .bind(input.skipped_count)
            .bind(&input.note)
            .bind(SyncRunStatus::Running.as_str())
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SyncRun>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sync_runs WHERE id = $1");
        sqlx::query_as::<_, SyncRun>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Most recently closed run for an entity type.
    pub async fn last_closed(
        pool: &PgPool,
        entity: EntityType,
    ) -> Result<Option<SyncRun>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sync_runs \
             WHERE entity_type = $1 AND status <> $2 \
             ORDER BY ended_at DESC NULLS LAST, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, SyncRun>(&query)
            .bind(entity.as_str())
            .bind(SyncRunStatus::Running.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Close runs left `running` by a crashed process.
    pub async fn fail_abandoned(pool: &PgPool, note: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sync_runs SET status = $1, ended_at = NOW(), note = $2 WHERE status = $3",
        )
        .bind(SyncRunStatus::Failed.as_str())
        .bind(note)
        .bind(SyncRunStatus::Running.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
