//! Bucket creation workflow.

use crate::clients::ObjectKey;
use crate::controllers::artifact::build_config_map;
use crate::controllers::s3bucket::BucketReconciler;
use crate::crd::{BucketState, S3Bucket};
use crate::error::{OperatorError, Result};
use crate::events::{Severity, REASON_CREATED, REASON_CREATE_FAILED, REASON_CREATING};
use tracing::{error, info, warn};

impl BucketReconciler {
    /// Create the bucket, wait for it and publish its ConfigMap.
    ///
    /// Safe to re-run from the top: the client reports a bucket we already
    /// own as success and the ConfigMap is applied, not created.
    pub(super) async fn create_bucket(&self, key: &ObjectKey, bucket: &S3Bucket) -> Result<()> {
        let spec = &bucket.spec;

        self.status.set_state(key, BucketState::Creating, None).await?;
        self.events.publish(
            bucket,
            Severity::Normal,
            REASON_CREATING,
            format!("Creating bucket {} in {}", spec.name, spec.region),
        );

        let outcome = match self.s3.create(&spec.name, &spec.region, spec.locked).await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail_creation(key, bucket, e).await),
        };

        if let Err(e) = self
            .s3
            .wait_until_exists(&spec.name, self.config.wait_timeout, self.config.poll_interval)
            .await
        {
            return Err(self.fail_creation(key, bucket, e).await);
        }

        let config_map = build_config_map(bucket, outcome.location());
        if let Err(e) = self.store.apply_config_map(&config_map).await {
            return Err(self.fail_creation(key, bucket, e).await);
        }

        self.status.set_state(key, BucketState::Created, None).await?;
        info!(bucket = %key, location = %outcome.location(), "S3 bucket ready");
        self.events.publish(
            bucket,
            Severity::Normal,
            REASON_CREATED,
            format!("Bucket {} is ready at {}", spec.name, outcome.location()),
        );
        Ok(())
    }

    /// Record a creation failure on the bucket and hand the error back.
    async fn fail_creation(
        &self,
        key: &ObjectKey,
        bucket: &S3Bucket,
        err: OperatorError,
    ) -> OperatorError {
        error!(bucket = %key, error = %err, "Bucket creation failed");
        let message = err.to_string();
        if let Err(status_err) = self
            .status
            .set_state(key, BucketState::Error, Some(&message))
            .await
        {
            warn!(bucket = %key, error = %status_err, "Could not record ERROR state");
        }
        self.events
            .publish(bucket, Severity::Warning, REASON_CREATE_FAILED, message);
        err
    }
}
