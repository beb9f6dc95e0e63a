//! External mirror state, one row per synced internal record.

use erpsync_core::entity::EntityType;
use erpsync_core::idempotency::MirrorView;
use erpsync_core::retry::ErrorClass;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `sync_mirrors` table.
///
/// `is_synced == true` implies `last_sync_error` is `None`; the table
/// enforces it with a check constraint.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SyncMirror {
    pub id: DbId,
    pub entity_type: String,
    pub internal_id: DbId,
    pub natural_key: String,
    pub external_id: Option<String>,
    pub external_code: Option<String>,
    pub is_synced: bool,
    pub content_hash: Option<String>,
    pub last_sync_error: Option<String>,
    pub last_error_class: Option<String>,
    pub last_attempt_hash: Option<String>,
    pub last_sync_at: Option<Timestamp>,
    pub retry_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SyncMirror {
    /// Borrowed view for the idempotency decision functions.
    ///
    /// An unrecognised error class is treated as transient so the record
    /// is retried rather than parked forever.
    pub fn view(&self) -> MirrorView<'_> {
        MirrorView {
            external_id: self.external_id.as_deref(),
            is_synced: self.is_synced,
            content_hash: self.content_hash.as_deref(),
            last_error_class: self
                .last_error_class
                .as_deref()
                .map(|c| ErrorClass::parse(c).unwrap_or(ErrorClass::Transient)),
            last_attempt_hash: self.last_attempt_hash.as_deref(),
        }
    }
}

/// Values written after the external system acknowledged a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorSuccess {
    pub entity_type: EntityType,
    pub internal_id: DbId,
    pub natural_key: String,
    pub external_id: String,
    pub external_code: Option<String>,
    pub content_hash: String,
}

/// Values written after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorFailure {
    pub entity_type: EntityType,
    pub internal_id: DbId,
    pub natural_key: String,
    pub error_class: ErrorClass,
    pub error_message: String,
    pub attempt_hash: String,
}
