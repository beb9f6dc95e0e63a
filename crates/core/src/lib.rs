//! Pure domain logic for the ERP synchronization subsystem.
//!
//! Nothing in this crate performs I/O. The storage, remote API and
//! scheduling layers live in `erpsync-db`, `erpsync-sync` and
//! `erpsync-worker`.

pub mod adjustment;
pub mod duplicate_detection;
pub mod entity;
pub mod error;
pub mod hashing;
pub mod idempotency;
pub mod mapping;
pub mod retry;
pub mod signature;
pub mod sync_status;
pub mod types;
