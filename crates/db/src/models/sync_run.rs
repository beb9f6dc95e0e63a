//! Sync run audit rows.

use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::sync_status::SyncRunStatus;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `sync_runs` table. Immutable once closed.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: DbId,
    pub entity_type: String,
    pub status: String,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub success_count: i32,
    pub failure_count: i32,
    pub skipped_count: i32,
    pub note: Option<String>,
}

impl SyncRun {
    pub fn entity(&self) -> Result<EntityType, CoreError> {
        EntityType::parse(&self.entity_type)
    }

    pub fn run_status(&self) -> Result<SyncRunStatus, CoreError> {
        SyncRunStatus::parse(&self.status)
    }
}

/// Terminal values written when a run is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseSyncRun {
    pub status: SyncRunStatus,
    pub success_count: i32,
    pub failure_count: i32,
    pub skipped_count: i32,
    pub note: Option<String>,
}
