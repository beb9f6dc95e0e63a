//! Duplicate scan over a snapshot of the external catalog.
//!
//! Read-only and advisory: the report is for operators and never feeds
//! back into the idempotency guard.

use std::sync::Arc;
use std::time::Duration;

use erpsync_core::duplicate_detection::{self, CatalogDuplicateGroup, DetectionSummary};
use erpsync_core::retry::RemoteError;
use serde::Serialize;

use crate::error::SyncError;
use crate::remote::AccountingApi;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub groups: Vec<CatalogDuplicateGroup>,
    pub summary: DetectionSummary,
}

pub struct DuplicateScanner {
    api: Arc<dyn AccountingApi>,
    timeout: Duration,
}

impl DuplicateScanner {
    pub fn new(api: Arc<dyn AccountingApi>, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn detect_duplicates(&self) -> Result<DuplicateReport, SyncError> {
        let catalog = tokio::time::timeout(self.timeout, self.api.list_catalog())
            .await
            .map_err(|_| RemoteError::Timeout {
                after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        let groups = duplicate_detection::detect_duplicates(&catalog);
        let summary = duplicate_detection::summarize(catalog.len(), &groups);
        tracing::info!(
            total_entries = summary.total_entries,
            group_count = summary.group_count,
            duplicate_entries = summary.duplicate_entries,
            "Catalog duplicate scan finished",
        );
        Ok(DuplicateReport { groups, summary })
    }
}
