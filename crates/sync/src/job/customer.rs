//! Customer (cari hesap) sync.

use async_trait::async_trait;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::types::DbId;
use erpsync_db::models::customer::Customer;

use super::EntitySync;
use crate::error::StoreError;
use crate::store::SyncStore;

/// Natural key: the customer code.
pub struct CustomerSync;

#[async_trait]
impl EntitySync for CustomerSync {
    type Record = Customer;

    fn entity_type(&self) -> EntityType {
        EntityType::Customer
    }

    fn internal_id(&self, record: &Customer) -> DbId {
        record.id
    }

    fn natural_key(&self, record: &Customer) -> String {
        record.code.trim().to_string()
    }

    fn content(&self, record: &Customer) -> serde_json::Value {
        serde_json::json!({
            "code": record.code,
            "name": record.name,
            "tax_number": record.tax_number,
            "tax_office": record.tax_office,
            "email": record.email,
            "phone": record.phone,
            "address": record.address,
            "city": record.city,
            "country": record.country,
        })
    }

    async fn select_eligible(&self, store: &dyn SyncStore) -> Result<Vec<Customer>, StoreError> {
        store.customer_candidates().await
    }

    fn build_payload(
        &self,
        record: &Customer,
        mappings: &MappingResolver,
    ) -> Result<serde_json::Value, CoreError> {
        if record.name.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Customer '{}' has no name",
                record.code
            )));
        }
        let tax_office = mappings.translate_opt(MappingType::TaxOffice, record.tax_office.as_deref())?;
        Ok(serde_json::json!({
            "account_code": record.code.trim(),
            "title": record.name.trim(),
            "tax_number": record.tax_number,
            "tax_office_code": tax_office,
            "email": record.email,
            "phone": record.phone,
            "address": record.address,
            "city": record.city,
            "country": record.country,
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn customer() -> Customer {
        let now = Utc::now();
        Customer {
            id: 1,
            code: " C-001 ".into(),
            name: "Acme Ltd".into(),
            tax_number: Some("1234567890".into()),
            tax_office: Some("Kadıköy".into()),
            email: None,
            phone: None,
            address: None,
            city: Some("İstanbul".into()),
            country: Some("TR".into()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn tax_office_is_translated() {
        let mappings = MappingResolver::new([(MappingType::TaxOffice, "Kadıköy", "034251")]);
        let payload = CustomerSync.build_payload(&customer(), &mappings).unwrap();
        assert_eq!(payload["tax_office_code"], "034251");
        assert_eq!(payload["account_code"], "C-001");
    }

    #[test]
    fn unmapped_tax_office_is_mapping_missing() {
        let result = CustomerSync.build_payload(&customer(), &MappingResolver::default());
        assert_matches!(
            result,
            Err(CoreError::MappingMissing { mapping_type: MappingType::TaxOffice, .. })
        );
    }

    #[test]
    fn fingerprint_ignores_timestamps() {
        let a = customer();
        let mut b = a.clone();
        b.updated_at = a.updated_at + chrono::Duration::hours(1);
        assert_eq!(CustomerSync.fingerprint(&a), CustomerSync.fingerprint(&b));
        b.name = "Acme Holding".into();
        assert_ne!(CustomerSync.fingerprint(&a), CustomerSync.fingerprint(&b));
    }
}
