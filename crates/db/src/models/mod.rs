//! Row models and DTOs, one module per table.

pub mod customer;
pub mod document_line;
pub mod event;
pub mod failed_sync_record;
pub mod invoice;
pub mod mapping_entry;
pub mod order;
pub mod pending_adjustment;
pub mod stock_movement;
pub mod sync_mirror;
pub mod sync_run;
