//! S3Bucket Kubernetes Operator
//!
//! A Kubernetes operator that provisions S3 buckets from `S3Bucket` custom
//! resources and removes them again when the resource is deleted.
//!
//! ## Custom Resources
//!
//! - `S3Bucket`: Creates a bucket and publishes a `<name>-cm` ConfigMap
//!   describing it (bucket name, region, lock mode and location)
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: s3.acme.io/v1alpha1
//! kind: S3Bucket
//! metadata:
//!   name: log-archive
//! spec:
//!   name: log-archive
//!   region: us-east-1
//!   locked: false
//! ```

pub mod clients;
pub mod conditions;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod events;
pub mod leader_election;
pub mod retry;

#[cfg(test)]
mod testing;

pub use clients::{BucketClient, BucketStore, KubeBucketStore, S3BucketClient, S3Settings};
pub use config::ReconcilerConfig;
pub use controllers::{BucketController, BucketReconciler};
pub use crd::{BucketCondition, BucketState, S3Bucket, S3BucketSpec, S3BucketStatus};
pub use error::{OperatorError, Result};
pub use events::{EventSink, KubeEventSink};
