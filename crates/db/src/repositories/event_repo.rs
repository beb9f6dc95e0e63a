//! Repository for the `sync_events` table.

use erpsync_core::types::DbId;
use sqlx::PgPool;

use crate::models::event::SyncEventRow;

const COLUMNS: &str = "id, event_type, entity_type, entity_id, actor, payload, created_at";

pub struct EventRepo;

impl EventRepo {
    /// Insert a new event row, returning the generated ID.
    pub async fn insert(
        pool: &PgPool,
        event_type: &str,
        entity_type: Option<&str>,
        entity_id: Option<DbId>,
        actor: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO sync_events (event_type, entity_type, entity_id, actor, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event_type)
        .bind(entity_type)
        .bind(entity_id)
        .bind(actor)
        .bind(payload)
        .fetch_one(pool)
        .await
    }

    /// List recent events newest-first.
    pub async fn list_recent(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SyncEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sync_events ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, SyncEventRow>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
