//! Error classification and retry policy for remote sync calls.
//!
//! Every failed record is assigned exactly one [`ErrorClass`]. The class
//! decides whether the next scheduled run picks the record up again or
//! whether it waits for operator action (new mapping, corrected data,
//! explicit replay).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Record-level failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network failure, timeout or 5xx-equivalent. Retried next run.
    Transient,
    /// The external system rejected the payload. Waits for a data fix or replay.
    Validation,
    /// A required code has no active mapping entry. Waits for an administrator.
    MappingMissing,
}

impl ErrorClass {
    /// String representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Validation => "validation",
            ErrorClass::MappingMissing => "mapping_missing",
        }
    }

    /// Parse the database representation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "transient" => Ok(ErrorClass::Transient),
            "validation" => Ok(ErrorClass::Validation),
            "mapping_missing" => Ok(ErrorClass::MappingMissing),
            other => Err(CoreError::Validation(format!("Unknown error class '{other}'"))),
        }
    }

    /// Whether the next scheduled run retries the record without operator action.
    pub fn is_auto_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }

    /// Whether a failure of this class increments the mirror's `retry_count`.
    ///
    /// A missing mapping fails identically until an administrator adds it,
    /// so repeated attempts are not counted.
    pub fn counts_toward_retry(&self) -> bool {
        !matches!(self, ErrorClass::MappingMissing)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

/// Failure of a single call to the external accounting platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The call did not complete within its per-call timeout.
    #[error("Remote call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Connection, DNS or protocol failure before a response arrived.
    #[error("Remote transport failure: {0}")]
    Transport(String),

    /// The remote answered with a non-success HTTP status.
    #[error("Remote returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The remote answered but its success discriminant was false.
    #[error("Remote rejected the payload: {0}")]
    Rejected(String),
}

/// Classify an HTTP status code returned by the external platform.
///
/// 408 (request timeout), 429 (rate limited) and every 5xx are transient;
/// any other non-success status means the payload itself was refused.
pub fn classify_http_status(status: u16) -> ErrorClass {
    match status {
        408 | 429 => ErrorClass::Transient,
        500..=599 => ErrorClass::Transient,
        _ => ErrorClass::Validation,
    }
}

/// Classify a remote call failure.
pub fn classify_remote_error(err: &RemoteError) -> ErrorClass {
    match err {
        RemoteError::Timeout { .. } | RemoteError::Transport(_) => ErrorClass::Transient,
        RemoteError::Status { status, .. } => classify_http_status(*status),
        RemoteError::Rejected(_) => ErrorClass::Validation,
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Decides how a failed record is classified, counted and picked up again.
///
/// Transient failures are retried by the next scheduled run. Validation
/// and mapping failures park the record until its content changes or an
/// operator replays it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy;

impl RetryPolicy {
    /// Classify a remote call failure.
    pub fn classify(&self, err: &RemoteError) -> ErrorClass {
        classify_remote_error(err)
    }

    /// Amount added to the mirror's `retry_count` for a failure of `class`.
    pub fn retry_increment(&self, class: ErrorClass) -> i32 {
        i32::from(class.counts_toward_retry())
    }

    /// Whether a record whose last attempt failed with `class` on content
    /// `attempt_hash` must wait for operator action before `content_hash`
    /// is attempted.
    pub fn is_parked(
        &self,
        class: Option<ErrorClass>,
        is_synced: bool,
        attempt_hash: Option<&str>,
        content_hash: &str,
    ) -> bool {
        match class {
            Some(class) if !class.is_auto_retryable() => {
                !is_synced && attempt_hash == Some(content_hash)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_and_transport_are_transient() {
        assert_eq!(
            classify_remote_error(&RemoteError::Timeout { after_ms: 30_000 }),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_remote_error(&RemoteError::Transport("connection reset".into())),
            ErrorClass::Transient
        );
    }

    #[test]
    fn server_errors_are_transient() {
        assert_eq!(classify_http_status(500), ErrorClass::Transient);
        assert_eq!(classify_http_status(503), ErrorClass::Transient);
        assert_eq!(classify_http_status(429), ErrorClass::Transient);
        assert_eq!(classify_http_status(408), ErrorClass::Transient);
    }

    #[test]
    fn client_errors_are_validation() {
        assert_eq!(classify_http_status(400), ErrorClass::Validation);
        assert_eq!(classify_http_status(422), ErrorClass::Validation);
        assert_eq!(
            classify_remote_error(&RemoteError::Rejected("invalid tax number".into())),
            ErrorClass::Validation
        );
    }

    #[test]
    fn only_transient_is_auto_retried() {
        assert!(ErrorClass::Transient.is_auto_retryable());
        assert!(!ErrorClass::Validation.is_auto_retryable());
        assert!(!ErrorClass::MappingMissing.is_auto_retryable());
    }

    #[test]
    fn mapping_missing_does_not_count_toward_retry() {
        assert!(ErrorClass::Transient.counts_toward_retry());
        assert!(ErrorClass::Validation.counts_toward_retry());
        assert!(!ErrorClass::MappingMissing.counts_toward_retry());
    }

    #[test]
    fn policy_classifies_and_counts() {
        let policy = RetryPolicy;
        assert_eq!(
            policy.classify(&RemoteError::Status {
                status: 503,
                message: "unavailable".into()
            }),
            ErrorClass::Transient
        );
        assert_eq!(policy.retry_increment(ErrorClass::Validation), 1);
        assert_eq!(policy.retry_increment(ErrorClass::MappingMissing), 0);
    }

    #[test]
    fn policy_parks_only_non_retryable_failures_on_unchanged_content() {
        let policy = RetryPolicy;
        assert!(!policy.is_parked(None, false, None, "h1"));
        assert!(!policy.is_parked(Some(ErrorClass::Transient), false, Some("h1"), "h1"));
        assert!(policy.is_parked(Some(ErrorClass::Validation), false, Some("h1"), "h1"));
        assert!(policy.is_parked(Some(ErrorClass::MappingMissing), false, Some("h1"), "h1"));
        assert!(!policy.is_parked(Some(ErrorClass::MappingMissing), false, Some("h1"), "h2"));
        assert!(!policy.is_parked(Some(ErrorClass::Validation), true, Some("h1"), "h1"));
    }

    #[test]
    fn remote_error_display() {
        let err = RemoteError::Status {
            status: 502,
            message: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "Remote returned HTTP 502: bad gateway");
    }
}
