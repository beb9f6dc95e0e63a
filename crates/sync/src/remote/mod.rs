//! Seam to the external accounting platform.

use async_trait::async_trait;
use erpsync_core::duplicate_detection::CatalogEntry;
use erpsync_core::entity::EntityType;
use erpsync_core::retry::RemoteError;
use serde::{Deserialize, Serialize};

pub mod http;

pub use http::HttpAccountingClient;

/// Acknowledgment of a successful create or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    pub external_id: String,
    pub external_code: Option<String>,
}

/// Per-entity create/update calls plus the catalog snapshot used by the
/// duplicate scan. Implementations must not retry internally; retry policy
/// belongs to the sync engine.
#[async_trait]
pub trait AccountingApi: Send + Sync {
    async fn create(
        &self,
        entity: EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError>;

    async fn update(
        &self,
        entity: EntityType,
        external_id: &str,
        payload: &serde_json::Value,
    ) -> Result<RemoteAck, RemoteError>;

    async fn list_catalog(&self) -> Result<Vec<CatalogEntry>, RemoteError>;
}
