//! Status subresource writes.

use crate::clients::{BucketStore, ObjectKey};
use crate::conditions::{merge_bucket_condition, ready_condition};
use crate::crd::BucketState;
use crate::error::{OperatorError, Result};
use crate::retry::{retry_on_conflict, Backoff};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

/// Moves a bucket between lifecycle states.
///
/// Every write starts from a fresh read of the object, never from the copy
/// the reconcile pass started with, and is retried on conflict.
pub struct StatusUpdater {
    store: Arc<dyn BucketStore>,
    backoff: Backoff,
}

impl StatusUpdater {
    pub fn new(store: Arc<dyn BucketStore>, backoff: Backoff) -> Self {
        Self { store, backoff }
    }

    /// Record `state` (and an optional detail message) on the bucket.
    ///
    /// Fails with [`OperatorError::InvalidState`] if the stored state cannot
    /// move to `state`, and with [`OperatorError::Conflict`] once the retry
    /// budget is spent.
    pub async fn set_state(
        &self,
        key: &ObjectKey,
        state: BucketState,
        message: Option<&str>,
    ) -> Result<()> {
        let store = &self.store;
        retry_on_conflict(&self.backoff, move || async move {
            let mut latest = store
                .get(key)
                .await?
                .ok_or_else(|| OperatorError::NotFound(format!("S3Bucket {}", key)))?;

            let mut status = latest.status.take().unwrap_or_default();
            let previous = status.state;
            if !previous.can_transition_to(state) {
                return Err(OperatorError::InvalidState(format!(
                    "S3Bucket {} cannot move from {} to {}",
                    key, previous, state
                )));
            }

            status.state = state;
            status.message = message.map(str::to_string);
            status.last_updated = Some(Utc::now().to_rfc3339());
            status.observed_generation = latest.metadata.generation;
            merge_bucket_condition(&mut status.conditions, ready_condition(state));
            latest.status = Some(status);

            store.update_status(&latest).await?;
            info!(bucket = %key, from = %previous, to = %state, "Updated bucket state");
            Ok(())
        })
        .await
    }
}
