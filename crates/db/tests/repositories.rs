//! Integration tests for the sync repositories.
//!
//! Require a PostgreSQL instance reachable through `DATABASE_URL`; run with
//! `cargo test -p erpsync-db -- --ignored`.

use chrono::{Duration, Utc};
use erpsync_core::adjustment::NewPendingAdjustment;
use erpsync_core::entity::EntityType;
use erpsync_core::mapping::MappingType;
use erpsync_core::retry::ErrorClass;
use erpsync_core::sync_status::SyncRunStatus;
use erpsync_db::models::customer::CreateCustomer;
use erpsync_db::models::failed_sync_record::{FailedRecordFilter, NewFailedSyncRecord};
use erpsync_db::models::mapping_entry::CreateMappingEntry;
use erpsync_db::models::sync_mirror::{MirrorFailure, MirrorSuccess};
use erpsync_db::models::sync_run::CloseSyncRun;
use erpsync_db::repositories::{
    CustomerRepo, EventRepo, FailedSyncRecordRepo, MappingEntryRepo, PendingAdjustmentRepo,
    StockMovementRepo, SyncMirrorRepo, SyncRunRepo,
};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_adjustment(order_id: &str) -> NewPendingAdjustment {
    NewPendingAdjustment {
        external_order_id: order_id.to_string(),
        product_id: 123,
        sku: "SKU-ABC-001".to_string(),
        quantity_delta: -5,
        requested_by: "webhook".to_string(),
        requested_at: Utc::now(),
        notes: None,
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn health_check_passes(pool: PgPool) {
    erpsync_db::health_check(&pool).await.unwrap();
}

// ---------------------------------------------------------------------------
// Mappings and events
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn mapping_upsert_replaces_target(pool: PgPool) {
    let input = |target: &str| CreateMappingEntry {
        mapping_type: MappingType::Sku,
        source_value: " SKU-1 ".into(),
        target_value: target.into(),
    };
    let first = MappingEntryRepo::upsert(&pool, &input("ST-1")).await.unwrap();
    let second = MappingEntryRepo::upsert(&pool, &input("ST-2")).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.source_value, "SKU-1");

    let active = MappingEntryRepo::list_active(&pool).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].target_value, "ST-2");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn events_are_listed_newest_first(pool: PgPool) {
    let payload = serde_json::json!({});
    let subject = Some("pending_adjustment");
    let older = EventRepo::insert(&pool, "adjustment.received", subject, Some(1), None, &payload)
        .await
        .unwrap();
    let newer = EventRepo::insert(&pool, "adjustment.approved", subject, Some(1), Some("ops"), &payload)
        .await
        .unwrap();

    let events = EventRepo::list_recent(&pool, 10, 0).await.unwrap();
    let ids: Vec<_> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![newer, older]);
    assert_eq!(events[0].actor.as_deref(), Some("ops"));
}

// ---------------------------------------------------------------------------
// Pending adjustments
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_open_order_is_ignored(pool: PgPool) {
    let first = PendingAdjustmentRepo::insert_unless_open(&pool, &new_adjustment("ORD-1"))
        .await
        .unwrap();
    let second = PendingAdjustmentRepo::insert_unless_open(&pool, &new_adjustment("ORD-1"))
        .await
        .unwrap();
    assert!(first.is_some());
    assert!(second.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn rejected_order_may_be_received_again(pool: PgPool) {
    let first = PendingAdjustmentRepo::insert_unless_open(&pool, &new_adjustment("ORD-2"))
        .await
        .unwrap()
        .unwrap();
    PendingAdjustmentRepo::reject(&pool, first.id, "ops", "wrong count")
        .await
        .unwrap()
        .unwrap();
    let again = PendingAdjustmentRepo::insert_unless_open(&pool, &new_adjustment("ORD-2"))
        .await
        .unwrap();
    assert!(again.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn approve_creates_movement_once(pool: PgPool) {
    let adj = PendingAdjustmentRepo::insert_unless_open(&pool, &new_adjustment("ORD-3"))
        .await
        .unwrap()
        .unwrap();

    let (approved, movement) = PendingAdjustmentRepo::approve(&pool, adj.id, "ops", "MAIN")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.status, "approved");
    assert_eq!(movement.movement_type, "out");
    assert_eq!(movement.source_document.as_deref(), Some("ORD-3"));
    assert_eq!(movement.pending_adjustment_id, Some(adj.id));

    let again = PendingAdjustmentRepo::approve(&pool, adj.id, "ops", "MAIN")
        .await
        .unwrap();
    assert!(again.is_none());

    let found = StockMovementRepo::find_by_adjustment(&pool, adj.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, movement.id);
}

// ---------------------------------------------------------------------------
// Mirrors and candidates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn synced_customer_is_no_longer_a_candidate(pool: PgPool) {
    let customer = CustomerRepo::create(
        &pool,
        &CreateCustomer {
            code: "C-001".into(),
            name: "Acme".into(),
            ..CreateCustomer::default()
        },
    )
    .await
    .unwrap();

    let candidates = CustomerRepo::list_sync_candidates(&pool).await.unwrap();
    assert_eq!(candidates.len(), 1);

    SyncMirrorRepo::upsert_success(
        &pool,
        &MirrorSuccess {
            entity_type: EntityType::Customer,
            internal_id: customer.id,
            natural_key: "C-001".into(),
            external_id: "EXT-1".into(),
            external_code: Some("120.01".into()),
            content_hash: "h1".into(),
        },
    )
    .await
    .unwrap();

    let candidates = CustomerRepo::list_sync_candidates(&pool).await.unwrap();
    assert!(candidates.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn mapping_failures_do_not_count_retries(pool: PgPool) {
    let failure = MirrorFailure {
        entity_type: EntityType::Stock,
        internal_id: 1,
        natural_key: "ORD-1:SKU".into(),
        error_class: ErrorClass::MappingMissing,
        error_message: "No active sku mapping for 'SKU'".into(),
        attempt_hash: "h1".into(),
    };
    SyncMirrorRepo::upsert_failure(&pool, &failure).await.unwrap();
    let mirror = SyncMirrorRepo::upsert_failure(&pool, &failure).await.unwrap();
    assert_eq!(mirror.retry_count, 0);
    assert!(!mirror.is_synced);

    let transient = MirrorFailure {
        error_class: ErrorClass::Transient,
        ..failure
    };
    let mirror = SyncMirrorRepo::upsert_failure(&pool, &transient).await.unwrap();
    assert_eq!(mirror.retry_count, 1);
}

// ---------------------------------------------------------------------------
// Runs and failed records
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn closed_run_is_not_rewritten(pool: PgPool) {
    let run = SyncRunRepo::open(&pool, EntityType::Invoice).await.unwrap();
    let close = CloseSyncRun {
        status: SyncRunStatus::Succeeded,
        success_count: 3,
        failure_count: 0,
        skipped_count: 1,
        note: None,
    };
    let closed = SyncRunRepo::close(&pool, run.id, &close).await.unwrap();
    assert!(closed.is_some());

    let again = SyncRunRepo::close(
        &pool,
        run.id,
        &CloseSyncRun {
            status: SyncRunStatus::Failed,
            ..close
        },
    )
    .await
    .unwrap();
    assert!(again.is_none());

    let last = SyncRunRepo::last_closed(&pool, EntityType::Invoice)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.status, "succeeded");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn purge_keeps_open_failures(pool: PgPool) {
    let run = SyncRunRepo::open(&pool, EntityType::Stock).await.unwrap();
    let new_record = |record_id| NewFailedSyncRecord {
        run_id: run.id,
        record_type: EntityType::Stock,
        record_id,
        natural_key: format!("ORD-{record_id}:SKU"),
        error_class: ErrorClass::Transient,
        error_message: "timeout".into(),
        original_payload: serde_json::json!({ "id": record_id }),
    };
    let open = FailedSyncRecordRepo::insert(&pool, &new_record(1)).await.unwrap();
    let done = FailedSyncRecordRepo::insert(&pool, &new_record(2)).await.unwrap();
    FailedSyncRecordRepo::mark_resolved(&pool, done.id).await.unwrap().unwrap();

    let purged = FailedSyncRecordRepo::purge_resolved_before(&pool, Utc::now() + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(purged, 1);

    let remaining = FailedSyncRecordRepo::list(&pool, &FailedRecordFilter::default())
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, open.id);
}
