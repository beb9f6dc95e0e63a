//! Pending stock adjustment ingestion, decisions and application.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::*;
use erpsync_core::adjustment::AdjustmentStatus;
use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::mapping::MappingType;
use erpsync_core::retry::RemoteError;
use erpsync_core::signature::{self, WebhookAuthMode};
use erpsync_db::models::pending_adjustment::AdjustmentFilter;
use erpsync_events::event_types;
use erpsync_sync::{
    PendingAdjustmentWorkflow, ReceiveOutcome, SyncError, SyncStore, WebhookSettings,
};

const SECRET: &str = "s3cret";

fn workflow(h: &Harness, settings: WebhookSettings) -> PendingAdjustmentWorkflow {
    PendingAdjustmentWorkflow::new(
        h.store.clone() as Arc<dyn SyncStore>,
        settings,
        h.events.clone(),
        Duration::from_secs(5),
    )
}

async fn received(wf: &PendingAdjustmentWorkflow, order_id: &str, delta: i32) -> i64 {
    match wf
        .receive(&notification(order_id, delta, Some(SECRET)))
        .await
        .unwrap()
    {
        ReceiveOutcome::Created(adjustment) => adjustment.id,
        other => panic!("expected a new adjustment, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notification_becomes_pending_adjustment() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let mut rx = h.events.subscribe();

    let outcome = wf
        .receive(&notification("ORD-1", -5, Some(SECRET)))
        .await
        .unwrap();

    let adjustment = assert_matches!(outcome, ReceiveOutcome::Created(a) => a);
    assert_eq!(adjustment.status, "pending");
    assert_eq!(adjustment.quantity_delta, -5);
    assert_eq!(adjustment.requested_by, "webhook");
    assert_eq!(adjustment.notes.as_deref(), Some("webhook event: stock.updated"));
    assert_eq!(rx.recv().await.unwrap().event_type, event_types::ADJUSTMENT_RECEIVED);
}

#[tokio::test]
async fn redelivery_of_open_order_is_ignored() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", 3).await;

    let again = wf
        .receive(&notification("ORD-1", 3, Some(SECRET)))
        .await
        .unwrap();

    assert_eq!(again, ReceiveOutcome::Duplicate { existing_id: Some(id) });
    assert_eq!(h.store.adjustments().await.len(), 1);
}

#[tokio::test]
async fn decided_order_can_be_received_again() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", 3).await;
    wf.reject(id, "alice", "wrong warehouse").await.unwrap();

    let second = received(&wf, "ORD-1", 3).await;
    assert_ne!(second, id);
}

#[tokio::test]
async fn unauthorized_notification_has_no_side_effects() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));

    for token in [None, Some("wrong")] {
        assert_matches!(
            wf.receive(&notification("ORD-1", 3, token)).await,
            Err(SyncError::Core(CoreError::Unauthorized(_)))
        );
    }
    // Authentication runs before validation.
    assert_matches!(
        wf.receive(&notification("", 0, Some("wrong"))).await,
        Err(SyncError::Core(CoreError::Unauthorized(_)))
    );
    assert!(h.store.adjustments().await.is_empty());
}

#[tokio::test]
async fn unconfigured_secret_rejects_everything() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::default());

    assert_matches!(
        wf.receive(&notification("ORD-1", 3, Some(""))).await,
        Err(SyncError::Core(CoreError::Unauthorized(_)))
    );
}

#[tokio::test]
async fn hmac_mode_accepts_signed_notification() {
    let h = harness();
    let settings = WebhookSettings {
        auth_mode: WebhookAuthMode::HmacSha256,
        ..WebhookSettings::shared_secret(SECRET)
    };
    let wf = workflow(&h, settings);
    let mut n = notification("ORD-9", 7, None);
    n.authenticity_token = Some(signature::sign(SECRET, &n).unwrap());

    assert_matches!(wf.receive(&n).await, Ok(ReceiveOutcome::Created(_)));

    n.quantity_delta = 70;
    assert_matches!(
        wf.receive(&n).await,
        Err(SyncError::Core(CoreError::Unauthorized(_)))
    );
}

#[tokio::test]
async fn invalid_notification_is_rejected_after_authentication() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));

    assert_matches!(
        wf.receive(&notification("ORD-1", 0, Some(SECRET))).await,
        Err(SyncError::Core(CoreError::Validation(_)))
    );
    let mut n = notification("ORD-2", 1, Some(SECRET));
    n.product_id = 0;
    assert_matches!(
        wf.receive(&n).await,
        Err(SyncError::Core(CoreError::Validation(_)))
    );
    assert!(h.store.adjustments().await.is_empty());
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approval_creates_movement_and_blocks_second_decision() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", -4).await;

    let (adjustment, movement) = wf.approve(id, "alice").await.unwrap();
    assert_eq!(adjustment.status, "approved");
    assert_eq!(adjustment.decided_by.as_deref(), Some("alice"));
    assert_eq!(movement.pending_adjustment_id, Some(id));
    assert_eq!(movement.warehouse_code, "MAIN");
    assert_eq!(movement.quantity_delta, -4);
    assert_eq!(movement.movement_type, "out");

    assert_matches!(wf.approve(id, "bob").await, Err(SyncError::Core(CoreError::Conflict(_))));
    assert_matches!(
        wf.reject(id, "bob", "late").await,
        Err(SyncError::Core(CoreError::Conflict(_)))
    );
    assert_eq!(h.store.movements().await.len(), 1);
}

#[tokio::test]
async fn decision_validation() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", 2).await;

    assert_matches!(wf.approve(id, "  ").await, Err(SyncError::Core(CoreError::Validation(_))));
    assert_matches!(
        wf.reject(id, "alice", " ").await,
        Err(SyncError::Core(CoreError::Validation(_)))
    );
    assert_matches!(
        wf.approve(9_999, "alice").await,
        Err(SyncError::Core(CoreError::NotFound { entity: "pending_adjustment", id: 9_999 }))
    );

    let rejected = wf.reject(id, "alice", "duplicate order").await.unwrap();
    assert_eq!(rejected.status, "rejected");
    assert_eq!(rejected.reason.as_deref(), Some("duplicate order"));
    assert!(h.store.movements().await.is_empty());
}

#[tokio::test]
async fn list_pending_defaults_to_pending_status() {
    let h = harness();
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let a = received(&wf, "ORD-1", 1).await;
    let b = received(&wf, "ORD-2", 1).await;
    wf.reject(b, "alice", "noise").await.unwrap();

    let pending = wf.list_pending(&AdjustmentFilter::default()).await.unwrap();
    assert_eq!(pending.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a]);

    let rejected = wf
        .list_pending(&AdjustmentFilter {
            status: Some(AdjustmentStatus::Rejected),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(rejected.iter().map(|p| p.id).collect::<Vec<_>>(), vec![b]);
}

// ---------------------------------------------------------------------------
// Application through the stock job
// ---------------------------------------------------------------------------

async fn map_stock(h: &Harness) {
    h.store.add_mapping(MappingType::Sku, "SKU-ABC-001", "ST-001").await;
    h.store.add_mapping(MappingType::Warehouse, "MAIN", "01").await;
}

#[tokio::test]
async fn approved_adjustment_is_applied_after_stock_sync() {
    let h = harness();
    map_stock(&h).await;
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", 6).await;
    wf.approve(id, "alice").await.unwrap();

    let run = h.orchestrator.run(EntityType::Stock).await.unwrap();

    assert_eq!(run.success_count, 1);
    let adjustment = h.store.adjustments().await.remove(0);
    assert_eq!(adjustment.status, "applied");
    assert!(adjustment.applied_at.is_some());
}

#[tokio::test]
async fn failed_stock_sync_leaves_adjustment_approved() {
    let h = harness();
    map_stock(&h).await;
    h.api.fail_when(|_, _| Some(RemoteError::Transport("connection reset".into())));
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let id = received(&wf, "ORD-1", 6).await;
    wf.approve(id, "alice").await.unwrap();

    let run = h.orchestrator.run(EntityType::Stock).await.unwrap();
    assert_eq!(run.failure_count, 1);
    assert_eq!(h.store.adjustments().await[0].status, "approved");

    h.api.succeed_always();
    h.orchestrator.run(EntityType::Stock).await.unwrap();
    assert_eq!(h.store.adjustments().await[0].status, "applied");
}

#[tokio::test]
async fn redelivered_order_posts_a_new_movement() {
    let h = harness();
    map_stock(&h).await;
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));

    let first = received(&wf, "ORD-1", -5).await;
    wf.approve(first, "alice").await.unwrap();
    h.orchestrator.run(EntityType::Stock).await.unwrap();

    let second = received(&wf, "ORD-1", -3).await;
    wf.approve(second, "alice").await.unwrap();
    let run = h.orchestrator.run(EntityType::Stock).await.unwrap();

    assert_eq!(run.success_count, 1);
    assert_eq!(h.api.creates(), 2);
    assert_eq!(h.api.updates(), 0);

    let mirrors = h.store.mirrors().await;
    assert_eq!(mirrors.len(), 2);
    assert_ne!(mirrors[0].external_id, mirrors[1].external_id);
    assert!(h
        .store
        .adjustments()
        .await
        .iter()
        .all(|a| a.status == "applied"));
}

#[tokio::test]
async fn terminal_adjustments_refuse_decisions() {
    let h = harness();
    map_stock(&h).await;
    let wf = workflow(&h, WebhookSettings::shared_secret(SECRET));
    let applied = received(&wf, "ORD-1", 3).await;
    wf.approve(applied, "alice").await.unwrap();
    h.orchestrator.run(EntityType::Stock).await.unwrap();
    let rejected = received(&wf, "ORD-2", 3).await;
    wf.reject(rejected, "alice", "wrong product").await.unwrap();

    for id in [applied, rejected] {
        assert_matches!(wf.approve(id, "bob").await, Err(SyncError::Core(CoreError::Conflict(_))));
        assert_matches!(
            wf.reject(id, "bob", "again").await,
            Err(SyncError::Core(CoreError::Conflict(_)))
        );
    }

    let statuses: Vec<_> = h
        .store
        .adjustments()
        .await
        .into_iter()
        .map(|a| (a.id, a.status))
        .collect();
    assert_eq!(
        statuses,
        vec![(applied, "applied".to_string()), (rejected, "rejected".to_string())]
    );
    assert_eq!(h.store.movements().await.len(), 1);
}
