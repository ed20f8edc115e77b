//! Collaborators the reconciler drives: the Kubernetes object store and the
//! S3 service. Both sit behind traits so the reconciler can be exercised
//! against in-memory fakes.

mod s3;
mod store;

pub use s3::{BucketClient, CreateOutcome, DeleteOutcome, S3BucketClient, S3Settings};
pub use store::{status_patch, BucketStore, KubeBucketStore, ObjectKey};
