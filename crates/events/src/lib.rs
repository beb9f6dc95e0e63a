//! Domain event bus for the ERP sync subsystem.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`SyncEvent`]: the domain event envelope.
//! - [`EventPersistence`]: background service that appends every event to
//!   the `sync_events` table.

pub mod bus;
pub mod persistence;

pub use bus::{event_types, EventBus, SyncEvent};
pub use persistence::EventPersistence;
