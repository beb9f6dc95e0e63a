//! Stock movement sync, and application of approved adjustments.
//!
//! A movement created by approving a pending adjustment carries
//! `pending_adjustment_id`. Once the movement is mirrored as synced the
//! adjustment moves `approved -> applied`. If the process stops between
//! the external acknowledgment and that transition, the next stock run
//! settles it in [`EntitySync::before_run`].

use async_trait::async_trait;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::mapping::{MappingResolver, MappingType};
use erpsync_core::types::DbId;
use erpsync_db::models::stock_movement::StockMovement;
use erpsync_events::{event_types, SyncEvent};

use super::{EntitySync, JobContext};
use crate::error::{bounded, StoreError};
use crate::remote::RemoteAck;
use crate::store::SyncStore;

pub struct StockSync;

impl StockSync {
    async fn settle(ctx: &JobContext<'_>, adjustment_id: DbId) -> Result<(), StoreError> {
        let applied = bounded(
            "mark_adjustment_applied",
            ctx.store_timeout,
            ctx.store.mark_adjustment_applied(adjustment_id),
        )
        .await?;
        if let Some(adjustment) = applied {
            tracing::info!(
                adjustment_id = adjustment.id,
                external_order_id = %adjustment.external_order_id,
                "Pending adjustment applied",
            );
            ctx.events.publish(
                SyncEvent::new(event_types::ADJUSTMENT_APPLIED)
                    .with_subject("pending_adjustment", adjustment.id)
                    .with_payload(serde_json::json!({
                        "external_order_id": adjustment.external_order_id,
                        "sku": adjustment.sku,
                        "quantity_delta": adjustment.quantity_delta,
                    })),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl EntitySync for StockSync {
    type Record = StockMovement;

    fn entity_type(&self) -> EntityType {
        EntityType::Stock
    }

    fn internal_id(&self, record: &StockMovement) -> DbId {
        record.id
    }

    /// One external movement per internal movement: `adjustment:{id}` for
    /// movements created by an approval, otherwise the movement id, prefixed
    /// with `{source_document}:{sku}:{warehouse}` when a document is set.
    /// A source document alone is not unique: the same order can be
    /// delivered, approved and posted more than once.
    fn natural_key(&self, record: &StockMovement) -> String {
        if let Some(adjustment_id) = record.pending_adjustment_id {
            return format!("adjustment:{adjustment_id}");
        }
        match record.source_document.as_deref().map(str::trim) {
            Some(doc) if !doc.is_empty() => format!(
                "{doc}:{}:{}:{}",
                record.sku.trim(),
                record.warehouse_code.trim(),
                record.id
            ),
            _ => format!("movement:{}", record.id),
        }
    }

    fn content(&self, record: &StockMovement) -> serde_json::Value {
        serde_json::json!({
            "sku": record.sku,
            "warehouse_code": record.warehouse_code,
            "unit_code": record.unit_code,
            "quantity_delta": record.quantity_delta,
            "movement_type": record.movement_type,
            "source_document": record.source_document,
            "occurred_at": record.occurred_at,
        })
    }

    async fn select_eligible(
        &self,
        store: &dyn SyncStore,
    ) -> Result<Vec<StockMovement>, StoreError> {
        store.stock_candidates().await
    }

    fn build_payload(
        &self,
        record: &StockMovement,
        mappings: &MappingResolver,
    ) -> Result<serde_json::Value, CoreError> {
        if record.quantity_delta == 0 {
            return Err(CoreError::Validation(format!(
                "Stock movement {} has a zero quantity",
                record.id
            )));
        }
        Ok(serde_json::json!({
            "stock_code": mappings.translate(MappingType::Sku, &record.sku)?,
            "warehouse_code": mappings.translate(MappingType::Warehouse, &record.warehouse_code)?,
            "unit_code": mappings.translate_opt(MappingType::Unit, record.unit_code.as_deref())?,
            "quantity": record.quantity_delta.unsigned_abs(),
            "direction": record.movement_type,
            "document_no": record.source_document,
            "date": record.occurred_at,
        }))
    }

    async fn apply_result(
        &self,
        ctx: &JobContext<'_>,
        record: &StockMovement,
        _ack: &RemoteAck,
    ) -> Result<(), StoreError> {
        match record.pending_adjustment_id {
            Some(adjustment_id) => Self::settle(ctx, adjustment_id).await,
            None => Ok(()),
        }
    }

    async fn before_run(&self, ctx: &JobContext<'_>) -> Result<(), StoreError> {
        let ids = bounded(
            "settleable_adjustment_ids",
            ctx.store_timeout,
            ctx.store.settleable_adjustment_ids(),
        )
        .await?;
        for id in ids {
            Self::settle(ctx, id).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;

    use super::*;

    fn movement(source_document: Option<&str>) -> StockMovement {
        let now = Utc::now();
        StockMovement {
            id: 7,
            sku: "SKU-ABC-001".into(),
            product_id: Some(123),
            warehouse_code: "MAIN".into(),
            unit_code: None,
            quantity_delta: -5,
            movement_type: "out".into(),
            source_document: source_document.map(str::to_string),
            pending_adjustment_id: None,
            occurred_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn mappings() -> MappingResolver {
        MappingResolver::new([
            (MappingType::Sku, "SKU-ABC-001", "ST-0001"),
            (MappingType::Warehouse, "MAIN", "01"),
        ])
    }

    #[test]
    fn natural_key_is_unique_per_movement() {
        assert_eq!(
            StockSync.natural_key(&movement(Some("ORD-1"))),
            "ORD-1:SKU-ABC-001:MAIN:7"
        );
        assert_eq!(StockSync.natural_key(&movement(None)), "movement:7");

        let mut again = movement(Some("ORD-1"));
        again.id = 8;
        assert_ne!(
            StockSync.natural_key(&again),
            StockSync.natural_key(&movement(Some("ORD-1")))
        );
    }

    #[test]
    fn approval_movements_are_keyed_by_adjustment() {
        let mut approved = movement(Some("ORD-1"));
        approved.pending_adjustment_id = Some(42);
        assert_eq!(StockSync.natural_key(&approved), "adjustment:42");
    }

    #[test]
    fn payload_uses_absolute_quantity_and_direction() {
        let payload = StockSync.build_payload(&movement(None), &mappings()).unwrap();
        assert_eq!(payload["quantity"], 5);
        assert_eq!(payload["direction"], "out");
        assert_eq!(payload["stock_code"], "ST-0001");
        assert_eq!(payload["warehouse_code"], "01");
    }

    #[test]
    fn warehouse_mapping_is_required() {
        let only_sku = MappingResolver::new([(MappingType::Sku, "SKU-ABC-001", "ST-0001")]);
        assert_matches!(
            StockSync.build_payload(&movement(None), &only_sku),
            Err(CoreError::MappingMissing { mapping_type: MappingType::Warehouse, .. })
        );
    }
}
