//! Create / update / skip decisions against the external mirror.
//!
//! The natural-key lookup performed here is the only protection against
//! creating the same business record twice on the external platform:
//! retries, restarts and replays all go through [`resolve`].

use serde::Serialize;

use crate::retry::{ErrorClass, RetryPolicy};

/// Borrowed view of a mirror row, independent of the storage model.
#[derive(Debug, Clone, Copy, Default)]
pub struct MirrorView<'a> {
    pub external_id: Option<&'a str>,
    pub is_synced: bool,
    /// Content fingerprint at the last successful sync.
    pub content_hash: Option<&'a str>,
    pub last_error_class: Option<ErrorClass>,
    /// Content fingerprint at the last failed attempt.
    pub last_attempt_hash: Option<&'a str>,
}

/// Why the guard decided no external call is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The external record exists and nothing relevant changed since the last sync.
    Unchanged { external_id: String },
}

/// The guard's verdict for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SyncVerdict {
    Create,
    Update { external_id: String },
    Skip(SkipReason),
}

/// Decide create-vs-update-vs-skip for a natural key.
///
/// `existing` is the mirror found for the record's natural key (any
/// internal record sharing the key), `content_hash` the fingerprint of the
/// record's payload-relevant fields right now.
pub fn resolve(existing: Option<MirrorView<'_>>, content_hash: &str) -> SyncVerdict {
    let Some(mirror) = existing else {
        return SyncVerdict::Create;
    };
    let Some(external_id) = mirror.external_id else {
        return SyncVerdict::Create;
    };
    if mirror.is_synced && mirror.content_hash == Some(content_hash) {
        return SyncVerdict::Skip(SkipReason::Unchanged {
            external_id: external_id.to_string(),
        });
    }
    SyncVerdict::Update {
        external_id: external_id.to_string(),
    }
}

/// Whether the record's last failure requires operator action before the
/// same content is attempted again.
pub fn is_parked(policy: &RetryPolicy, mirror: &MirrorView<'_>, content_hash: &str) -> bool {
    policy.is_parked(
        mirror.last_error_class,
        mirror.is_synced,
        mirror.last_attempt_hash,
        content_hash,
    )
}
