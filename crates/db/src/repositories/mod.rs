//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod customer_repo;
pub mod event_repo;
pub mod failed_sync_record_repo;
pub mod invoice_repo;
pub mod mapping_entry_repo;
pub mod order_repo;
pub mod pending_adjustment_repo;
pub mod stock_movement_repo;
pub mod sync_mirror_repo;
pub mod sync_run_repo;

pub use customer_repo::CustomerRepo;
pub use event_repo::EventRepo;
pub use failed_sync_record_repo::FailedSyncRecordRepo;
pub use invoice_repo::InvoiceRepo;
pub use mapping_entry_repo::MappingEntryRepo;
pub use order_repo::OrderRepo;
pub use pending_adjustment_repo::PendingAdjustmentRepo;
pub use stock_movement_repo::StockMovementRepo;
pub use sync_mirror_repo::SyncMirrorRepo;
pub use sync_run_repo::SyncRunRepo;

/// `WHERE` clause selecting internal rows (aliased `e`) that need a sync
/// attempt: never mirrored, last attempt failed, or changed since the
/// last successful sync. Expects the mirror join aliased `m`.
pub(crate) const NEEDS_SYNC_PREDICATE: &str = "\
    (m.id IS NULL OR NOT m.is_synced OR m.last_sync_at IS NULL OR e.updated_at > m.last_sync_at)";
