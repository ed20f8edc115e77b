//! Object store access for `S3Bucket` resources and their ConfigMaps.

use crate::crd::S3Bucket;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use std::fmt;
use tracing::debug;

const FIELD_MANAGER: &str = "s3bucket-operator";

/// Namespace-scoped identity of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_resource<K: ResourceExt>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Versioned reads and writes of `S3Bucket` objects and their ConfigMaps.
///
/// `update` and `update_status` are compare-on-write: they carry the
/// object's `resourceVersion` and fail with [`OperatorError::Conflict`] when
/// the stored object has moved on.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Fetch the latest version; `None` when the object does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<S3Bucket>>;

    /// Persist `metadata.finalizers`.
    async fn update(&self, bucket: &S3Bucket) -> Result<S3Bucket>;

    /// Persist the status subresource.
    async fn update_status(&self, bucket: &S3Bucket) -> Result<S3Bucket>;

    /// Create or overwrite a ConfigMap.
    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Delete a ConfigMap; [`OperatorError::NotFound`] when it is absent.
    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()>;
}

/// [`BucketStore`] backed by the Kubernetes API server.
pub struct KubeBucketStore {
    client: Client,
}

impl KubeBucketStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn buckets(&self, namespace: &str) -> Api<S3Bucket> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn resource_version(bucket: &S3Bucket) -> Result<String> {
    bucket.resource_version().ok_or_else(|| {
        OperatorError::InvalidState(format!(
            "S3Bucket {} has no resourceVersion",
            bucket.name_any()
        ))
    })
}

/// Merge patch body that writes the whole status of `bucket`.
///
/// Unset fields are sent as `null` so the API server drops values left over
/// from an earlier state instead of keeping them.
pub fn status_patch(bucket: &S3Bucket) -> Result<serde_json::Value> {
    let status = bucket.status.clone().unwrap_or_default();
    Ok(serde_json::json!({
        "metadata": {
            "resourceVersion": resource_version(bucket)?,
        },
        "status": {
            "state": status.state,
            "conditions": status.conditions,
            "message": status.message,
            "lastUpdated": status.last_updated,
            "observedGeneration": status.observed_generation,
        },
    }))
}

#[async_trait]
impl BucketStore for KubeBucketStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<S3Bucket>> {
        Ok(self.buckets(&key.namespace).get_opt(&key.name).await?)
    }

    async fn update(&self, bucket: &S3Bucket) -> Result<S3Bucket> {
        let key = ObjectKey::from_resource(bucket);
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version(bucket)?,
                "finalizers": bucket.finalizers(),
            }
        });
        debug!(bucket = %key, "Updating finalizers");
        let updated = self
            .buckets(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }

    async fn update_status(&self, bucket: &S3Bucket) -> Result<S3Bucket> {
        let key = ObjectKey::from_resource(bucket);
        let patch = status_patch(bucket)?;
        debug!(bucket = %key, "Updating status");
        let updated = self
            .buckets(&key.namespace)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(updated)
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let key = ObjectKey::from_resource(config_map);
        self.config_maps(&key.namespace)
            .patch(
                &key.name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(config_map),
            )
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()> {
        self.config_maps(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await?;
        Ok(())
    }
}
