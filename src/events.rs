//! Kubernetes Events for bucket lifecycle transitions.
//!
//! Publishing is fire-and-forget: the reconciler never waits on an event
//! and a failed publish only produces a log line.

use crate::crd::S3Bucket;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

pub const REASON_CREATING: &str = "CreatingBucket";
pub const REASON_CREATED: &str = "BucketCreated";
pub const REASON_CREATE_FAILED: &str = "CreateFailed";
pub const REASON_DELETING: &str = "DeletingBucket";
pub const REASON_DELETED: &str = "BucketDeleted";
pub const REASON_DELETE_FAILED: &str = "DeleteFailed";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

/// Severity of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

/// Observer notified after notable transitions. Must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, bucket: &S3Bucket, severity: Severity, reason: &str, message: String);
}

/// Publishes events through the kube-runtime event recorder.
#[derive(Clone)]
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, controller: &str, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

impl EventSink for KubeEventSink {
    fn publish(&self, bucket: &S3Bucket, severity: Severity, reason: &str, message: String) {
        let recorder = self.recorder.clone();
        let reference = bucket.object_ref(&());
        let name = bucket.name_any();
        let event = Event {
            type_: match severity {
                Severity::Normal => EventType::Normal,
                Severity::Warning => EventType::Warning,
            },
            reason: reason.to_string(),
            note: Some(message),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.publish(&event, &reference).await {
                warn!(bucket = %name, error = %e, "Failed to publish event");
            }
        });
    }
}
