//! Code mapping entries.

use erpsync_core::error::CoreError;
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `mapping_entries` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct MappingEntry {
    pub id: DbId,
    pub mapping_type: String,
    pub source_value: String,
    pub target_value: String,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MappingEntry {
    pub fn kind(&self) -> Result<MappingType, CoreError> {
        MappingType::parse(&self.mapping_type)
    }
}

/// Build a resolver from stored rows, ignoring inactive entries.
///
/// Rows with an unknown mapping type are skipped with a warning.
pub fn resolver_from_entries(entries: &[MappingEntry]) -> MappingResolver {
    MappingResolver::new(entries.iter().filter(|e| e.is_active).filter_map(|e| {
        match e.kind() {
            Ok(kind) => Some((kind, e.source_value.clone(), e.target_value.clone())),
            Err(err) => {
                tracing::warn!(mapping_id = e.id, error = %err, "Skipping mapping entry");
                None
            }
        }
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMappingEntry {
    pub mapping_type: MappingType,
    pub source_value: String,
    pub target_value: String,
}
