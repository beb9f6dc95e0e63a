//! Repository for the `customers` table.

use erpsync_core::entity::EntityType;
use erpsync_core::types::DbId;
use sqlx::PgPool;

use super::NEEDS_SYNC_PREDICATE;
use crate::models::customer::{CreateCustomer, Customer};

const COLUMNS: &str = "\
    id, code, name, tax_number, tax_office, email, phone, address, city, country, \
    is_active, created_at, updated_at";

const ALIASED_COLUMNS: &str = "\
    e.id, e.code, e.name, e.tax_number, e.tax_office, e.email, e.phone, e.address, \
    e.city, e.country, e.is_active, e.created_at, e.updated_at";

pub struct CustomerRepo;

impl CustomerRepo {
    pub async fn create(pool: &PgPool, input: &CreateCustomer) -> Result<Customer, sqlx::Error> {
        let query = format!(
            "INSERT INTO customers \
                (code, name, tax_number, tax_office, email, phone, address, city, country) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Customer>(&query)
            .bind(&input.code)
            .bind(&input.name)
            .bind(&input.tax_number)
            .bind(&input.tax_office)
            .bind(&input.email)
            .bind(&input.phone)
            .bind(&input.address)
            .bind(&input.city)
            .bind(&input.country)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Customer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM customers WHERE id = $1");
        sqlx::query_as::<_, Customer>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Active customers that need a sync attempt.
    pub async fn list_sync_candidates(pool: &PgPool) -> Result<Vec<Customer>, sqlx::Error> {
        let query = format!(
            "SELECT {ALIASED_COLUMNS} FROM customers e \
             LEFT JOIN sync_mirrors m ON m.entity_type = $1 AND m.internal_id = e.id \
             WHERE e.is_active AND {NEEDS_SYNC_PREDICATE} \
             ORDER BY e.id"
        );
        sqlx::query_as::<_, Customer>(&query)
            .bind(EntityType::Customer.as_str())
            .fetch_all(pool)
            .await
    }
}
