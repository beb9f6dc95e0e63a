//! Failed sync record model and DTOs.

use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::retry::ErrorClass;
use erpsync_core::sync_status::FailedRecordStatus;
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `failed_sync_records` table.
///
/// `original_payload` is the JSON snapshot of the internal record at the
/// time of the failure; replay deserializes it back into the record type.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct FailedSyncRecord {
    pub id: DbId,
    pub run_id: DbId,
    pub record_type: String,
    pub record_id: DbId,
    pub natural_key: String,
    pub error_class: String,
    pub error_message: String,
    pub original_payload: serde_json::Value,
    pub failed_at: Timestamp,
    pub status: String,
    pub retry_count: i32,
    pub last_retry_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
}

impl FailedSyncRecord {
    pub fn entity(&self) -> Result<EntityType, CoreError> {
        EntityType::parse(&self.record_type)
    }

    pub fn class(&self) -> Result<ErrorClass, CoreError> {
        ErrorClass::parse(&self.error_class)
    }

    pub fn record_status(&self) -> Result<FailedRecordStatus, CoreError> {
        FailedRecordStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewFailedSyncRecord {
    pub run_id: DbId,
    pub record_type: EntityType,
    pub record_id: DbId,
    pub natural_key: String,
    pub error_class: ErrorClass,
    pub error_message: String,
    pub original_payload: serde_json::Value,
}

/// Filters for listing failed records. `limit` defaults to 50, capped at 500.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailedRecordFilter {
    pub record_type: Option<EntityType>,
    pub status: Option<FailedRecordStatus>,
    pub error_class: Option<ErrorClass>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 500;

/// Clamp list pagination to sane bounds.
pub fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT),
        offset.unwrap_or(0).max(0),
    )
}
