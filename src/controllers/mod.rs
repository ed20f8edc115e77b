//! Controllers for the S3Bucket operator
//!
//! The reconciler is split by concern: lifecycle dispatch, status writes,
//! finalizer handling, the published ConfigMap, and the creation and
//! deletion workflows.

mod artifact;
mod creation;
mod deletion;
mod finalizer;
mod s3bucket;
mod state;
mod status;

pub use artifact::{build_config_map, config_map_key, config_map_name};
pub use finalizer::FinalizerManager;
pub use s3bucket::{BucketController, BucketReconciler, Requeue};
pub use state::{current_state, decide, has_finalizer, Step};
pub use status::StatusUpdater;
