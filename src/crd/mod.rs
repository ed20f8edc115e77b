//! Custom Resource Definitions for the S3Bucket operator
//!
//! Defines the CRD that the operator manages:
//! - S3Bucket: an S3 bucket and the ConfigMap describing it

mod s3bucket;

pub use s3bucket::{BucketCondition, BucketState, S3Bucket, S3BucketSpec, S3BucketStatus};
