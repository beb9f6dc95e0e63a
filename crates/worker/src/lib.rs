//! Background worker for the ERP sync engine.
//!
//! - [`config`]: environment configuration.
//! - [`scheduler`]: periodic `run_all` plus failed-record retention.
//! - [`services`]: construction of the engine services from one store,
//!   one remote client and one event bus.

pub mod config;
pub mod scheduler;
pub mod services;

pub use config::{ConfigError, WorkerConfig};
pub use scheduler::SyncScheduler;
pub use services::Services;
