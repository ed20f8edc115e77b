//! Bucket deletion workflow.

use crate::clients::{DeleteOutcome, ObjectKey};
use crate::controllers::artifact::config_map_key;
use crate::controllers::s3bucket::BucketReconciler;
use crate::crd::{BucketState, S3Bucket};
use crate::error::{OperatorError, Result};
use crate::events::{Severity, REASON_DELETED, REASON_DELETE_FAILED, REASON_DELETING};
use tracing::{debug, info, warn};

impl BucketReconciler {
    /// Delete the bucket and its ConfigMap, then release the finalizer.
    ///
    /// Any failure before the bucket is confirmed gone leaves the finalizer
    /// in place so the next pass starts over.
    pub(super) async fn delete_bucket(&self, key: &ObjectKey, bucket: &S3Bucket) -> Result<()> {
        let name = &bucket.spec.name;
        info!(bucket = %key, "Handling deletion of S3Bucket");

        if let Err(e) = self.status.set_state(key, BucketState::Deleting, None).await {
            warn!(bucket = %key, error = %e, "Could not record DELETING state, continuing");
        }
        self.events.publish(
            bucket,
            Severity::Normal,
            REASON_DELETING,
            format!("Deleting bucket {}", name),
        );

        match self.s3.delete(name).await {
            Ok(DeleteOutcome::Deleted) => debug!(bucket = %key, "Delete request accepted"),
            Ok(DeleteOutcome::AlreadyGone) => info!(bucket = %key, "Bucket was already gone"),
            Err(e) => return Err(self.fail_deletion(key, bucket, e).await),
        }

        if let Err(e) = self
            .s3
            .wait_until_gone(name, self.config.wait_timeout, self.config.poll_interval)
            .await
        {
            return Err(self.fail_deletion(key, bucket, e).await);
        }

        let config_map = config_map_key(bucket);
        match self.store.delete_config_map(&config_map).await {
            Ok(()) => info!(configmap = %config_map, "Deleted ConfigMap"),
            Err(e) if e.is_not_found() => debug!(configmap = %config_map, "ConfigMap already gone"),
            Err(e) => warn!(
                configmap = %config_map,
                error = %e,
                "Failed to delete ConfigMap, leaving it to garbage collection"
            ),
        }

        self.finalizers.remove(key).await?;
        info!(bucket = %key, "S3Bucket cleanup finished");
        self.events.publish(
            bucket,
            Severity::Normal,
            REASON_DELETED,
            format!("Bucket {} deleted", name),
        );
        Ok(())
    }

    /// Report a failed deletion pass and hand the error back.
    ///
    /// Storage service failures move the bucket to ERROR. A bucket that still
    /// holds objects stays DELETING until someone empties it.
    async fn fail_deletion(
        &self,
        key: &ObjectKey,
        bucket: &S3Bucket,
        err: OperatorError,
    ) -> OperatorError {
        warn!(bucket = %key, error = %err, "Bucket deletion failed, keeping finalizer");
        let message = err.to_string();
        if err.is_external() {
            if let Err(status_err) = self
                .status
                .set_state(key, BucketState::Error, Some(&message))
                .await
            {
                warn!(bucket = %key, error = %status_err, "Could not record ERROR state");
            }
        }
        self.events
            .publish(bucket, Severity::Warning, REASON_DELETE_FAILED, message);
        err
    }
}
