//! Runtime policy for the bucket reconciler

use crate::retry::Backoff;
use std::time::Duration;

/// Requeue delay for buckets sitting in ERROR.
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(300);
/// Requeue delay for buckets caught in CREATING or DELETING.
pub const DEFAULT_TRANSITIONAL_REQUEUE: Duration = Duration::from_secs(30);
/// Upper bound on waiting for a bucket to appear or disappear.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Timing and retry policy used by [`crate::controllers::BucketReconciler`].
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub error_requeue: Duration,
    pub transitional_requeue: Duration,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
    /// Backoff for conflicting status and finalizer writes
    pub conflict_backoff: Backoff,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            error_requeue: DEFAULT_ERROR_REQUEUE,
            transitional_requeue: DEFAULT_TRANSITIONAL_REQUEUE,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            conflict_backoff: Backoff::default(),
        }
    }
}
