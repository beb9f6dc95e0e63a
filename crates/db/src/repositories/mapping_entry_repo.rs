//! Repository for the `mapping_entries` table.

use sqlx::PgPool;

use crate::models::mapping_entry::{CreateMappingEntry, MappingEntry};

const COLUMNS: &str =
    "id, mapping_type, source_value, target_value, is_active, created_at, updated_at";

pub struct MappingEntryRepo;

impl MappingEntryRepo {
    pub async fn list_active(pool: &PgPool) -> Result<Vec<MappingEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM mapping_entries WHERE is_active \
             ORDER BY mapping_type, source_value"
        );
        sqlx::query_as::<_, MappingEntry>(&query).fetch_all(pool).await
    }

    /// Insert or re-activate a mapping, replacing its target value.
    pub async fn upsert(
        pool: &PgPool,
        input: &CreateMappingEntry,
    ) -> Result<MappingEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO mapping_entries (mapping_type, source_value, target_value) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (mapping_type, source_value) DO UPDATE SET \
                target_value = EXCLUDED.target_value, is_active = TRUE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MappingEntry>(&query)
            .bind(input.mapping_type.as_str())
            .bind(input.source_value.trim())
            .bind(&input.target_value)
            .fetch_one(pool)
            .await
    }
}
