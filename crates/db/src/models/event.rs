//! Persisted domain events.

use erpsync_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `sync_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncEventRow {
    pub id: DbId,
    pub event_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<DbId>,
    pub actor: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}
