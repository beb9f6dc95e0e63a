//! Sales invoice sync.

use async_trait::async_trait;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::types::DbId;
use erpsync_db::models::invoice::Invoice;

use super::{map_lines, EntitySync};
use crate::error::StoreError;
use crate::store::SyncStore;

/// Natural key: `{invoice_number}/{customer_code}`.
pub struct InvoiceSync;

#[async_trait]
impl EntitySync for InvoiceSync {
    type Record = Invoice;

    fn entity_type(&self) -> EntityType {
        EntityType::Invoice
    }

    fn internal_id(&self, record: &Invoice) -> DbId {
        record.id
    }

    fn natural_key(&self, record: &Invoice) -> String {
        format!(
            "{}/{}",
            record.invoice_number.trim(),
            record.customer_code.trim()
        )
    }

    fn content(&self, record: &Invoice) -> serde_json::Value {
        serde_json::json!({
            "invoice_number": record.invoice_number,
            "customer_code": record.customer_code,
            "issued_at": record.issued_at,
            "currency": record.currency,
            "warehouse_code": record.warehouse_code,
            "lines": record.lines.0,
        })
    }

    async fn select_eligible(&self, store: &dyn SyncStore) -> Result<Vec<Invoice>, StoreError> {
        store.invoice_candidates().await
    }

    fn build_payload(
        &self,
        record: &Invoice,
        mappings: &MappingResolver,
    ) -> Result<serde_json::Value, CoreError> {
        let document = format!("Invoice {}", record.invoice_number);
        let lines = map_lines(&document, &record.lines, mappings)?;
        Ok(serde_json::json!({
            "document_no": record.invoice_number.trim(),
            "account_code": record.customer_code.trim(),
            "date": record.issued_at,
            "currency": record.currency,
            "warehouse_code": mappings.translate_opt(MappingType::Warehouse, record.warehouse_code.as_deref())?,
            "lines": lines,
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use erpsync_db::models::document_line::DocumentLine;
    use sqlx::types::Json;

    use super::*;

    fn invoice(lines: Vec<DocumentLine>) -> Invoice {
        let now = Utc::now();
        Invoice {
            id: 3,
            invoice_number: "INV-2025-0042".into(),
            customer_code: "C-001".into(),
            issued_at: now,
            currency: "TRY".into(),
            warehouse_code: None,
            lines: Json(lines),
            created_at: now,
            updated_at: now,
        }
    }

    fn line(sku: &str) -> DocumentLine {
        DocumentLine {
            sku: sku.into(),
            quantity: 2.0,
            unit_code: None,
            unit_price_minor: 12_500,
            tax_rate_percent: 20,
        }
    }

    #[test]
    fn natural_key_combines_number_and_customer() {
        assert_eq!(InvoiceSync.natural_key(&invoice(vec![])), "INV-2025-0042/C-001");
    }

    #[test]
    fn empty_invoice_is_validation_error() {
        assert_matches!(
            InvoiceSync.build_payload(&invoice(vec![]), &MappingResolver::default()),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn every_line_needs_a_sku_mapping() {
        let mappings = MappingResolver::new([(MappingType::Sku, "A", "ST-A")]);
        let result = InvoiceSync.build_payload(&invoice(vec![line("A"), line("B")]), &mappings);
        assert_matches!(
            result,
            Err(CoreError::MappingMissing { source_value, .. }) if source_value == "B"
        );
    }
}
