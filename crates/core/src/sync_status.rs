//! Sync run and failed-record status values.
//!
//! A sync run is opened as `Running` and closed exactly once with a
//! terminal status summarizing its per-record outcomes. The summary never
//! short-circuits the batch: it is computed after every eligible record
//! has been attempted (or the run was cancelled).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Note stored on a run that was cancelled between records.
pub const CANCELLED_NOTE: &str = "cancelled";

// ---------------------------------------------------------------------------
// SyncRunStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a single `SyncRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Running,
    Succeeded,
    Failed,
    PartiallyFailed,
}

impl SyncRunStatus {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncRunStatus::Running => "running",
            SyncRunStatus::Succeeded => "succeeded",
            SyncRunStatus::Failed => "failed",
            SyncRunStatus::PartiallyFailed => "partially_failed",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "running" => Ok(SyncRunStatus::Running),
            "succeeded" => Ok(SyncRunStatus::Succeeded),
            "failed" => Ok(SyncRunStatus::Failed),
            "partially_failed" => Ok(SyncRunStatus::PartiallyFailed),
            other => Err(CoreError::Validation(format!(
                "Unknown sync run status '{other}'"
            ))),
        }
    }

    /// Whether the run has been closed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SyncRunStatus::Running)
    }

    /// Only a fully successful run counts as success at the batch level.
    pub fn is_success(&self) -> bool {
        matches!(self, SyncRunStatus::Succeeded)
    }
}

impl fmt::Display for SyncRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compute the terminal status of a run from its counters.
///
/// - cancelled runs are always `Failed`;
/// - no failures (including an empty run) is `Succeeded`;
/// - failures and no successes is `Failed`;
/// - anything else is `PartiallyFailed`.
pub fn summarize_run(success_count: i32, failure_count: i32, cancelled: bool) -> SyncRunStatus {
    if cancelled {
        return SyncRunStatus::Failed;
    }
    match (success_count, failure_count) {
        (_, 0) => SyncRunStatus::Succeeded,
        (0, _) => SyncRunStatus::Failed,
        _ => SyncRunStatus::PartiallyFailed,
    }
}

// ---------------------------------------------------------------------------
// FailedRecordStatus
// ---------------------------------------------------------------------------

/// Status of a `FailedSyncRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedRecordStatus {
    /// Awaiting the next run (transient) or an operator replay.
    Failed,
    /// A replay succeeded; the record is kept for audit only.
    Resolved,
}

impl FailedRecordStatus {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailedRecordStatus::Failed => "failed",
            FailedRecordStatus::Resolved => "resolved",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "failed" => Ok(FailedRecordStatus::Failed),
            "resolved" => Ok(FailedRecordStatus::Resolved),
            other => Err(CoreError::Validation(format!(
                "Unknown failed record status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for FailedRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_run_succeeds() {
        assert_eq!(summarize_run(0, 0, false), SyncRunStatus::Succeeded);
    }

    #[test]
    fn all_success_succeeds() {
        assert_eq!(summarize_run(4, 0, false), SyncRunStatus::Succeeded);
    }

    #[test]
    fn all_failed_fails() {
        assert_eq!(summarize_run(0, 3, false), SyncRunStatus::Failed);
    }

    #[test]
    fn mixed_is_partial() {
        assert_eq!(summarize_run(2, 1, false), SyncRunStatus::PartiallyFailed);
    }

    #[test]
    fn cancelled_is_failed_even_with_successes() {
        assert_eq!(summarize_run(5, 0, true), SyncRunStatus::Failed);
    }

    #[test]
    fn partial_is_not_batch_success() {
        assert!(!SyncRunStatus::PartiallyFailed.is_success());
        assert!(SyncRunStatus::PartiallyFailed.is_terminal());
        assert!(!SyncRunStatus::Running.is_terminal());
    }

    #[test]
    fn statuses_round_trip_through_storage_names() {
        for status in [
            SyncRunStatus::Running,
            SyncRunStatus::Succeeded,
            SyncRunStatus::Failed,
            SyncRunStatus::PartiallyFailed,
        ] {
            assert_eq!(SyncRunStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(FailedRecordStatus::parse("retrying").is_err());
    }
}
