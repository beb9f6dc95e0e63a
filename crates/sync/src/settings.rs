//! Runtime settings for sync jobs and webhook ingestion.

use std::time::Duration;

use erpsync_core::adjustment::{DEFAULT_REQUESTED_BY, DEFAULT_WAREHOUSE_CODE};
use erpsync_core::signature::WebhookAuthMode;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_PARALLEL: usize = 10;

#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Bound on each external API call.
    pub call_timeout: Duration,
    /// Bound on each datastore call.
    pub store_timeout: Duration,
    /// Records in flight per run.
    pub max_parallel: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub auth_mode: WebhookAuthMode,
    /// `None` or empty rejects every notification.
    pub secret: Option<String>,
    /// Stored as `requested_by` on ingested adjustments.
    pub requested_by: String,
    /// Warehouse for movements created on approval.
    pub default_warehouse: String,
}

impl WebhookSettings {
    pub fn shared_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: Some(secret.into()),
            ..Self::default()
        }
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            auth_mode: WebhookAuthMode::SharedSecret,
            secret: None,
            requested_by: DEFAULT_REQUESTED_BY.to_string(),
            default_warehouse: DEFAULT_WAREHOUSE_CODE.to_string(),
        }
    }
}
