//! Purchase and sales order sync. One job per [`OrderKind`].

use async_trait::async_trait;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::types::DbId;
use erpsync_db::models::order::{Order, OrderKind};

use super::{map_lines, EntitySync};
use crate::error::StoreError;
use crate::store::SyncStore;

/// Natural key: `{order_number}/{counterparty_code}`.
pub struct OrderSync {
    pub kind: OrderKind,
}

impl OrderSync {
    pub fn purchase() -> Self {
        Self {
            kind: OrderKind::Purchase,
        }
    }

    pub fn sales() -> Self {
        Self {
            kind: OrderKind::Sales,
        }
    }
}

#[async_trait]
impl EntitySync for OrderSync {
    type Record = Order;

    fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    fn internal_id(&self, record: &Order) -> DbId {
        record.id
    }

    fn natural_key(&self, record: &Order) -> String {
        format!(
            "{}/{}",
            record.order_number.trim(),
            record.counterparty_code.trim()
        )
    }

    fn content(&self, record: &Order) -> serde_json::Value {
        serde_json::json!({
            "kind": record.kind,
            "order_number": record.order_number,
            "counterparty_code": record.counterparty_code,
            "ordered_at": record.ordered_at,
            "warehouse_code": record.warehouse_code,
            "currency": record.currency,
            "lines": record.lines.0,
        })
    }

    async fn select_eligible(&self, store: &dyn SyncStore) -> Result<Vec<Order>, StoreError> {
        store.order_candidates(self.kind).await
    }

    fn build_payload(
        &self,
        record: &Order,
        mappings: &MappingResolver,
    ) -> Result<serde_json::Value, CoreError> {
        if record.kind != self.kind.as_str() {
            return Err(CoreError::Validation(format!(
                "Order {} is a {} order, not {}",
                record.order_number, record.kind, self.kind
            )));
        }
        let document = format!("{} order {}", self.kind, record.order_number);
        let lines = map_lines(&document, &record.lines, mappings)?;
        Ok(serde_json::json!({
            "document_no": record.order_number.trim(),
            "account_code": record.counterparty_code.trim(),
            "date": record.ordered_at,
            "currency": record.currency,
            "warehouse_code": mappings.translate(MappingType::Warehouse, &record.warehouse_code)?,
            "lines": lines,
        }))
    }
}
