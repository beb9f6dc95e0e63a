//! Error types for the sync engine.

use std::future::Future;
use std::time::Duration;

use erpsync_core::entity::EntityType;
use erpsync_core::error::CoreError;
use erpsync_core::retry::RemoteError;

/// Failure of a datastore call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Datastore call '{operation}' timed out")]
    Timeout { operation: &'static str },

    /// A stored value could not be interpreted, e.g. an unknown status string.
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
}

impl From<CoreError> for StoreError {
    fn from(err: CoreError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Errors surfaced by the orchestrator, the workflow and the scanner.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A second run for the same entity type was requested while one is in flight.
    #[error("Sync run for {0} is already in progress")]
    AlreadyRunning(EntityType),

    #[error("No sync job registered for {0}")]
    JobNotRegistered(EntityType),

    #[error("Sync orchestrator is shutting down")]
    ShuttingDown,
}

/// Bound a datastore call by `limit`.
pub async fn bounded<T, F>(operation: &'static str, limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| StoreError::Timeout { operation })?
}
