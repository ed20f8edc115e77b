//! S3Bucket Custom Resource Definition
//!
//! Declares the desired bucket (name, region, object lock) and the
//! lifecycle state the operator reports back.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// S3Bucket is the Schema for the s3buckets API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "s3.acme.io",
    version = "v1alpha1",
    kind = "S3Bucket",
    namespaced,
    status = "S3BucketStatus",
    shortname = "s3b",
    printcolumn = r#"{"name":"Bucket Name","type":"string","jsonPath":".spec.name"}"#,
    printcolumn = r#"{"name":"Region","type":"string","jsonPath":".spec.region"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketSpec {
    /// Name of the bucket in the storage service
    pub name: String,

    /// Region the bucket is placed in
    pub region: String,

    /// Enable object lock on the bucket. Only honoured at creation time.
    #[serde(default)]
    pub locked: bool,
}

/// Status of the S3Bucket
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketStatus {
    /// Lifecycle state
    #[serde(default)]
    pub state: BucketState,

    /// Conditions representing bucket state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<BucketCondition>,

    /// Human-readable detail for the current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last update timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,

    /// Last observed generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Lifecycle state of the bucket
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BucketState {
    /// No reconcile has run yet
    #[default]
    #[serde(rename = "")]
    Empty,
    /// Accepted, creation not started
    Pending,
    /// Bucket creation in progress
    Creating,
    /// Bucket and ConfigMap exist
    Created,
    /// Bucket teardown in progress
    Deleting,
    /// Creation or deletion failed; needs outside intervention
    Error,
}

impl BucketState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BucketState::Empty => "",
            BucketState::Pending => "PENDING",
            BucketState::Creating => "CREATING",
            BucketState::Created => "CREATED",
            BucketState::Deleting => "DELETING",
            BucketState::Error => "ERROR",
        }
    }
}

impl fmt::Display for BucketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketState::Empty => f.write_str("EMPTY"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Condition of the bucket
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}
