//! Natural-key lookup in front of every external write.
//!
//! A record's own mirror wins when it already carries an external id.
//! Otherwise the guard searches every mirror of the same entity type for
//! the record's natural key, so a record re-created internally (new id,
//! same business identity) is linked to the existing external record
//! instead of creating a second one.

use std::time::Duration;

use erpsync_core::entity::EntityType;
use erpsync_core::idempotency::{self, SyncVerdict};
use erpsync_db::models::sync_mirror::SyncMirror;

use crate::error::{bounded, StoreError};
use crate::store::SyncStore;

/// The guard's verdict plus the external code known for the matched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: SyncVerdict,
    pub external_code: Option<String>,
}

pub struct IdempotencyGuard<'a> {
    store: &'a dyn SyncStore,
    store_timeout: Duration,
}

impl<'a> IdempotencyGuard<'a> {
    pub fn new(store: &'a dyn SyncStore, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Decide create, update or skip for one record.
    ///
    /// `own` is the record's own mirror, already loaded by the caller.
    pub async fn resolve(
        &self,
        entity: EntityType,
        own: Option<&SyncMirror>,
        natural_key: &str,
        content_hash: &str,
    ) -> Result<Resolution, StoreError> {
        if let Some(mirror) = own.filter(|m| m.external_id.is_some()) {
            return Ok(Resolution {
                verdict: idempotency::resolve(Some(mirror.view()), content_hash),
                external_code: mirror.external_code.clone(),
            });
        }

        let matched = bounded(
            "find_mirror_by_natural_key",
            self.store_timeout,
            self.store.find_mirror_by_natural_key(entity, natural_key),
        )
        .await?;

        if let Some(other) = &matched {
            if other.external_id.is_some() {
                tracing::debug!(
                    entity_type = %entity,
                    natural_key,
                    linked_internal_id = other.internal_id,
                    "Natural key already mirrored by another record",
                );
            }
        }

        Ok(Resolution {
            verdict: idempotency::resolve(matched.as_ref().map(SyncMirror::view), content_hash),
            external_code: matched.and_then(|m| m.external_code),
        })
    }
}
