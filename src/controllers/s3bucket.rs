//! S3Bucket Controller
//!
//! Reconciles `S3Bucket` resources: provisions the bucket in S3, publishes a
//! ConfigMap describing it, and tears both down again before letting the
//! resource go.

use crate::clients::{BucketClient, BucketStore, ObjectKey};
use crate::conditions::BUCKET_FINALIZER;
use crate::config::ReconcilerConfig;
use crate::controllers::finalizer::FinalizerManager;
use crate::controllers::state::{current_state, decide, Step};
use crate::controllers::status::StatusUpdater;
use crate::crd::S3Bucket;
use crate::error::{OperatorError, Result};
use crate::events::{EventSink, Severity, REASON_RECONCILE_ERROR};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// When the work queue should hand a bucket back to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Right away, e.g. after adding the finalizer
    Immediately,
    /// After a fixed delay
    After(Duration),
    /// Only when the object or something it owns changes
    AwaitChange,
}

impl From<Requeue> for Action {
    fn from(requeue: Requeue) -> Self {
        match requeue {
            Requeue::Immediately => Action::requeue(Duration::ZERO),
            Requeue::After(delay) => Action::requeue(delay),
            Requeue::AwaitChange => Action::await_change(),
        }
    }
}

/// Drives one `S3Bucket` towards its desired state per call.
///
/// The reconciler is level-triggered: each pass acts on the object as it is
/// stored now, and the only progress it persists is `status.state`.
pub struct BucketReconciler {
    pub(super) store: Arc<dyn BucketStore>,
    pub(super) s3: Arc<dyn BucketClient>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) status: StatusUpdater,
    pub(super) finalizers: FinalizerManager,
    pub(super) config: ReconcilerConfig,
}

impl BucketReconciler {
    pub fn new(
        store: Arc<dyn BucketStore>,
        s3: Arc<dyn BucketClient>,
        events: Arc<dyn EventSink>,
        config: ReconcilerConfig,
    ) -> Self {
        let status = StatusUpdater::new(store.clone(), config.conflict_backoff.clone());
        let finalizers =
            FinalizerManager::new(store.clone(), config.conflict_backoff.clone(), BUCKET_FINALIZER);
        Self {
            store,
            s3,
            events,
            status,
            finalizers,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one reconcile pass for the bucket stored under `key`.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<Requeue> {
        let Some(bucket) = self.store.get(key).await? else {
            debug!(bucket = %key, "S3Bucket no longer exists");
            return Ok(Requeue::AwaitChange);
        };

        match decide(&bucket) {
            Step::Finalize => {
                self.delete_bucket(key, &bucket).await?;
                Ok(Requeue::AwaitChange)
            }
            Step::Released => {
                debug!(bucket = %key, "Cleanup already finished, waiting for removal");
                Ok(Requeue::AwaitChange)
            }
            Step::AddFinalizer => {
                self.finalizers.add(key).await?;
                Ok(Requeue::Immediately)
            }
            Step::Create => {
                self.create_bucket(key, &bucket).await?;
                Ok(Requeue::AwaitChange)
            }
            Step::Idle => Ok(Requeue::AwaitChange),
            Step::Backoff => {
                let message = bucket
                    .status
                    .as_ref()
                    .and_then(|s| s.message.clone())
                    .unwrap_or_else(|| "previous operation failed".to_string());
                warn!(
                    bucket = %key,
                    message = %message,
                    "S3Bucket is in ERROR, set it to PENDING to retry"
                );
                self.events.publish(
                    &bucket,
                    Severity::Warning,
                    REASON_RECONCILE_ERROR,
                    format!("Bucket {} is in ERROR: {}", bucket.spec.name, message),
                );
                Ok(Requeue::After(self.config.error_requeue))
            }
            Step::Poll => {
                info!(
                    bucket = %key,
                    state = %current_state(&bucket),
                    "S3Bucket is mid-transition, checking back later"
                );
                Ok(Requeue::After(self.config.transitional_requeue))
            }
        }
    }

    /// Requeue delay after a failed pass.
    ///
    /// Storage service failures back off for the long delay; everything else
    /// (non-empty bucket, exhausted conflict retries, API errors) is retried
    /// after the short one.
    pub fn requeue_after_error(&self, error: &OperatorError) -> Duration {
        if error.is_external() {
            self.config.error_requeue
        } else {
            self.config.transitional_requeue
        }
    }

    async fn reconcile_object(&self, bucket: Arc<S3Bucket>) -> Result<Action> {
        let key = ObjectKey::from_resource(bucket.as_ref());
        info!("Reconciling S3Bucket {}", key);
        self.reconcile(&key).await.map(Action::from)
    }

    fn error_policy(&self, bucket: &S3Bucket, error: &OperatorError) -> Action {
        let key = ObjectKey::from_resource(bucket);
        let delay = self.requeue_after_error(error);
        error!(bucket = %key, error = %error, requeue = ?delay, "Reconciliation error");
        Action::requeue(delay)
    }
}

/// Watches `S3Bucket`s and the ConfigMaps they own and feeds them to a
/// [`BucketReconciler`].
pub struct BucketController {
    client: Client,
    reconciler: Arc<BucketReconciler>,
    namespace: Option<String>,
}

impl BucketController {
    /// Create a controller; `namespace = None` watches all namespaces.
    pub fn new(client: Client, reconciler: BucketReconciler, namespace: Option<String>) -> Self {
        Self {
            client,
            reconciler: Arc::new(reconciler),
            namespace,
        }
    }

    /// Run the controller until a shutdown signal arrives
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (buckets, config_maps): (Api<S3Bucket>, Api<ConfigMap>) = match &self.namespace {
            Some(ns) => (
                Api::namespaced(self.client.clone(), ns),
                Api::namespaced(self.client.clone(), ns),
            ),
            None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
        };

        info!(namespace = ?self.namespace, "Starting S3Bucket controller");

        Controller::new(buckets, Config::default())
            .owns(config_maps, Config::default())
            .shutdown_on_signal()
            .run(
                |bucket, ctx| async move { ctx.reconcile_object(bucket).await },
                |bucket, error, ctx| ctx.error_policy(&bucket, error),
                Arc::clone(&self.reconciler),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => {
                        info!("Reconciled S3Bucket: {}", obj.name);
                    }
                    Err(e) => {
                        error!("Reconciliation failed: {:?}", e);
                    }
                }
            })
            .await;

        info!("S3Bucket controller stopped");
        Ok(())
    }
}
