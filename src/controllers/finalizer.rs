//! Deletion-guard finalizer management.

use crate::clients::{BucketStore, ObjectKey};
use crate::error::{OperatorError, Result};
use crate::retry::{retry_on_conflict, Backoff};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Idempotent add/remove of one finalizer token.
pub struct FinalizerManager {
    store: Arc<dyn BucketStore>,
    backoff: Backoff,
    token: String,
}

impl FinalizerManager {
    pub fn new(store: Arc<dyn BucketStore>, backoff: Backoff, token: impl Into<String>) -> Self {
        Self {
            store,
            backoff,
            token: token.into(),
        }
    }

    /// Add the token to the latest version of the object, if missing.
    pub async fn add(&self, key: &ObjectKey) -> Result<()> {
        let store = &self.store;
        let token = self.token.as_str();
        retry_on_conflict(&self.backoff, move || async move {
            let mut latest = store
                .get(key)
                .await?
                .ok_or_else(|| OperatorError::NotFound(format!("S3Bucket {}", key)))?;

            if latest.finalizers().iter().any(|f| f == token) {
                debug!(bucket = %key, "Finalizer already present");
                return Ok(());
            }

            latest.finalizers_mut().push(token.to_string());
            store.update(&latest).await?;
            info!(bucket = %key, finalizer = %token, "Added finalizer");
            Ok(())
        })
        .await
    }

    /// Remove the token from the latest version of the object, if present.
    ///
    /// An object that no longer exists has nothing to remove.
    pub async fn remove(&self, key: &ObjectKey) -> Result<()> {
        let store = &self.store;
        let token = self.token.as_str();
        retry_on_conflict(&self.backoff, move || async move {
            let Some(mut latest) = store.get(key).await? else {
                debug!(bucket = %key, "Object already gone");
                return Ok(());
            };

            if !latest.finalizers().iter().any(|f| f == token) {
                debug!(bucket = %key, "Finalizer already removed");
                return Ok(());
            }

            latest.finalizers_mut().retain(|f| f != token);
            store.update(&latest).await?;
            info!(bucket = %key, finalizer = %token, "Removed finalizer");
            Ok(())
        })
        .await
    }
}
