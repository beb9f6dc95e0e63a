//! Synchronization engine between the internal ERP and the external
//! accounting platform.
//!
//! - [`store`]: datastore seam ([`SyncStore`]) with PostgreSQL and
//!   in-memory implementations.
//! - [`remote`]: external accounting API seam ([`AccountingApi`]) and its
//!   HTTP client.
//! - [`job`]: the per-entity sync job framework and the five entity jobs.
//! - [`orchestrator`]: at-most-one run per entity type, batch runs,
//!   cancellation, status and failed-record replay.
//! - [`workflow`]: the approval-gated pending stock adjustment workflow.
//! - [`detection`]: duplicate scan over the external catalog.

pub mod detection;
pub mod error;
pub mod guard;
pub mod job;
pub mod orchestrator;
pub mod remote;
pub mod settings;
pub mod store;
pub mod workflow;

pub use detection::{DuplicateReport, DuplicateScanner};
pub use error::{StoreError, SyncError};
pub use orchestrator::{BatchSyncResult, EntitySyncStatus, SyncOrchestrator};
pub use remote::{AccountingApi, RemoteAck};
pub use settings::{JobSettings, WebhookSettings};
pub use store::SyncStore;
pub use workflow::{PendingAdjustmentWorkflow, ReceiveOutcome};
