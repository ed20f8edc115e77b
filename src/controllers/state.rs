//! Bucket lifecycle state machine and per-pass dispatch.

use crate::conditions::BUCKET_FINALIZER;
use crate::crd::{BucketState, S3Bucket};
use kube::ResourceExt;

impl BucketState {
    /// Whether the reconciler may move a bucket from `self` to `next`.
    ///
    /// Rewriting the current state is always allowed so that a resumed
    /// workflow can repeat its first status write.
    pub fn can_transition_to(self, next: BucketState) -> bool {
        use BucketState::*;

        if self == next || next == Deleting {
            return true;
        }
        match self {
            Empty | Pending => matches!(next, Pending | Creating),
            Creating => matches!(next, Created | Error),
            Created => false,
            Error => next == Pending,
            Deleting => next == Error,
        }
    }
}

/// What a single reconcile pass should do with a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deletion requested and our finalizer present: tear down
    Finalize,
    /// Deletion requested and cleanup already finished
    Released,
    /// Finalizer missing: add it and come back before touching S3
    AddFinalizer,
    /// Run the creation workflow
    Create,
    /// Bucket created; nothing to do
    Idle,
    /// Bucket in ERROR; report and retry slowly
    Backoff,
    /// A workflow was interrupted; check back soon
    Poll,
}

pub fn has_finalizer(bucket: &S3Bucket) -> bool {
    bucket.finalizers().iter().any(|f| f == BUCKET_FINALIZER)
}

pub fn current_state(bucket: &S3Bucket) -> BucketState {
    bucket
        .status
        .as_ref()
        .map(|s| s.state)
        .unwrap_or_default()
}

/// Pick the branch for this pass from the bucket's observed state.
pub fn decide(bucket: &S3Bucket) -> Step {
    if bucket.metadata.deletion_timestamp.is_some() {
        return if has_finalizer(bucket) {
            Step::Finalize
        } else {
            Step::Released
        };
    }

    if !has_finalizer(bucket) {
        return Step::AddFinalizer;
    }

    match current_state(bucket) {
        BucketState::Empty | BucketState::Pending => Step::Create,
        BucketState::Created => Step::Idle,
        BucketState::Error => Step::Backoff,
        BucketState::Creating | BucketState::Deleting => Step::Poll,
    }
}
