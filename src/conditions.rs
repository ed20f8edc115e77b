//! Kubernetes-standard status condition helpers
//!
//! Provides constants and builder functions for the conditions the
//! operator keeps on `S3Bucket` status, following the Kubernetes API
//! conventions.

use crate::crd::{BucketCondition, BucketState};
use chrono::Utc;

// Condition status values
pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

// S3Bucket condition types
pub const BUCKET_CONDITION_READY: &str = "Ready";

// Finalizer names
pub const BUCKET_FINALIZER: &str = "s3bucket.s3.acme.io/finalizer";

/// Build a condition with the current timestamp.
pub fn build_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> ConditionFields {
    ConditionFields {
        condition_type: condition_type.to_string(),
        status: status.to_string(),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// The `Ready` condition that corresponds to a lifecycle state.
pub fn ready_condition(state: BucketState) -> ConditionFields {
    let (status, reason, message) = match state {
        BucketState::Empty | BucketState::Pending => {
            (CONDITION_UNKNOWN, "Pending", "Bucket has not been provisioned yet")
        }
        BucketState::Creating => (CONDITION_FALSE, "Creating", "Bucket is being created"),
        BucketState::Created => (CONDITION_TRUE, "Created", "Bucket exists and is described by its ConfigMap"),
        BucketState::Deleting => (CONDITION_FALSE, "Deleting", "Bucket is being deleted"),
        BucketState::Error => (CONDITION_FALSE, "Error", "Bucket operation failed"),
    };
    build_condition(BUCKET_CONDITION_READY, status, reason, message)
}

/// Generic condition fields, convertible to and from the CRD condition type.
#[derive(Debug, Clone)]
pub struct ConditionFields {
    pub condition_type: String,
    pub status: String,
    pub last_transition_time: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ConditionFields {
    pub fn into_bucket_condition(self) -> BucketCondition {
        BucketCondition {
            r#type: self.condition_type,
            status: self.status,
            last_transition_time: self.last_transition_time,
            reason: self.reason,
            message: self.message,
        }
    }
}

impl From<BucketCondition> for ConditionFields {
    fn from(c: BucketCondition) -> Self {
        Self {
            condition_type: c.r#type,
            status: c.status,
            last_transition_time: c.last_transition_time,
            reason: c.reason,
            message: c.message,
        }
    }
}

/// Set or update a condition in a list, preserving lastTransitionTime when status hasn't changed.
pub fn set_condition(conditions: &mut Vec<ConditionFields>, new: ConditionFields) {
    if let Some(existing) = conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        if existing.status != new.status {
            *existing = new;
        } else {
            existing.reason = new.reason;
            existing.message = new.message;
        }
    } else {
        conditions.push(new);
    }
}

/// Merge `new` into a CRD condition list.
pub fn merge_bucket_condition(conditions: &mut Vec<BucketCondition>, new: ConditionFields) {
    let mut fields: Vec<ConditionFields> = conditions.drain(..).map(ConditionFields::from).collect();
    set_condition(&mut fields, new);
    conditions.extend(fields.into_iter().map(ConditionFields::into_bucket_condition));
}
