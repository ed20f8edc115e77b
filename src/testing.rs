//! In-memory stand-ins for the object store, the S3 service and the event
//! recorder, used by the reconciler tests.

use crate::clients::{
    status_patch, BucketClient, BucketStore, CreateOutcome, DeleteOutcome, ObjectKey,
};
use crate::crd::{S3Bucket, S3BucketSpec};
use crate::error::{OperatorError, Result};
use crate::events::{EventSink, Severity};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub const NAMESPACE: &str = "default";

/// A fresh bucket object as a user would submit it.
pub fn new_bucket(name: &str, region: &str, locked: bool) -> S3Bucket {
    let mut bucket = S3Bucket::new(
        name,
        S3BucketSpec {
            name: name.to_string(),
            region: region.to_string(),
            locked,
        },
    );
    bucket.metadata.namespace = Some(NAMESPACE.to_string());
    bucket.metadata.uid = Some(format!("uid-{}", name));
    bucket.metadata.generation = Some(1);
    bucket
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

#[derive(Default)]
struct StoreState {
    buckets: HashMap<ObjectKey, S3Bucket>,
    config_maps: HashMap<ObjectKey, ConfigMap>,
    version: u64,
    conflicts: u32,
    status_failures: u32,
    config_map_failure: Option<String>,
    config_map_delete_failure: Option<String>,
    status_writes: u32,
}

impl StoreState {
    fn bump(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Compare-on-write check shared by both update paths.
    fn check_version(&mut self, key: &ObjectKey, bucket: &S3Bucket) -> Result<()> {
        if self.conflicts > 0 {
            self.conflicts -= 1;
            return Err(OperatorError::Conflict("injected conflict".to_string()));
        }
        let stored = self
            .buckets
            .get(key)
            .ok_or_else(|| OperatorError::NotFound(key.to_string()))?;
        if stored.resource_version() != bucket.resource_version() {
            return Err(OperatorError::Conflict(format!(
                "{} has resourceVersion {:?}, write carried {:?}",
                key,
                stored.resource_version(),
                bucket.resource_version()
            )));
        }
        Ok(())
    }
}

/// Apply a JSON merge patch (RFC 7386): `null` removes a key, objects merge
/// recursively, anything else replaces the target.
pub fn merge_json(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(existing) = target {
        for (name, value) in fields {
            if value.is_null() {
                existing.remove(name);
            } else {
                merge_json(existing.entry(name.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// [`BucketStore`] keeping objects in memory with resourceVersion checks.
///
/// Removing the last finalizer from an object that has a deletion
/// timestamp removes the object, and status writes are merged into the
/// stored status, as the API server would do.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn with_bucket(bucket: S3Bucket) -> Self {
        let store = Self::default();
        store.insert(bucket);
        store
    }

    pub fn insert(&self, mut bucket: S3Bucket) {
        let mut state = self.state.lock().unwrap();
        bucket.metadata.resource_version = Some(state.bump());
        state.buckets.insert(ObjectKey::from_resource(&bucket), bucket);
    }

    pub fn bucket(&self, key: &ObjectKey) -> Option<S3Bucket> {
        self.state.lock().unwrap().buckets.get(key).cloned()
    }

    pub fn config_map(&self, key: &ObjectKey) -> Option<ConfigMap> {
        self.state.lock().unwrap().config_maps.get(key).cloned()
    }

    /// Mark the object for deletion, like `kubectl delete` does.
    pub fn request_deletion(&self, key: &ObjectKey) {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        if let Some(bucket) = state.buckets.get_mut(key) {
            bucket.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            bucket.metadata.resource_version = Some(version);
        }
    }

    /// Fail the next `n` compare-on-write calls with a conflict.
    pub fn inject_conflicts(&self, n: u32) {
        self.state.lock().unwrap().conflicts = n;
    }

    /// Fail the next `n` status writes with an API error.
    pub fn fail_status_updates(&self, n: u32) {
        self.state.lock().unwrap().status_failures = n;
    }

    pub fn fail_config_map_apply(&self, message: &str) {
        self.state.lock().unwrap().config_map_failure = Some(message.to_string());
    }

    pub fn fail_config_map_delete(&self, message: &str) {
        self.state.lock().unwrap().config_map_delete_failure = Some(message.to_string());
    }

    pub fn status_writes(&self) -> u32 {
        self.state.lock().unwrap().status_writes
    }
}

#[async_trait]
impl BucketStore for FakeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<S3Bucket>> {
        let snapshot = self.bucket(key);
        // Let concurrent writers interleave between this read and the caller's write.
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn update(&self, bucket: &S3Bucket) -> Result<S3Bucket> {
        let key = ObjectKey::from_resource(bucket);
        let mut state = self.state.lock().unwrap();
        state.check_version(&key, bucket)?;
        let version = state.bump();

        let stored = state.buckets.get_mut(&key).expect("checked above");
        stored.metadata.finalizers = Some(bucket.finalizers().to_vec());
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.buckets.remove(&key);
        }
        Ok(updated)
    }

    async fn update_status(&self, bucket: &S3Bucket) -> Result<S3Bucket> {
        let key = ObjectKey::from_resource(bucket);
        let mut state = self.state.lock().unwrap();
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(OperatorError::KubeApi("status subresource unavailable".to_string()));
        }
        state.check_version(&key, bucket)?;
        let patch = status_patch(bucket)?;
        let version = state.bump();
        state.status_writes += 1;

        let stored = state.buckets.get_mut(&key).expect("checked above");
        let mut status = serde_json::to_value(&stored.status).expect("status serializes");
        merge_json(&mut status, &patch["status"]);
        stored.status = serde_json::from_value(status).expect("merged status parses");
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.config_map_failure.clone() {
            return Err(OperatorError::KubeApi(message));
        }
        state
            .config_maps
            .insert(ObjectKey::from_resource(config_map), config_map.clone());
        Ok(())
    }

    async fn delete_config_map(&self, key: &ObjectKey) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.config_map_delete_failure.clone() {
            return Err(OperatorError::KubeApi(message));
        }
        state
            .config_maps
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| OperatorError::NotFound(key.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeBucket {
    pub region: String,
    pub locked: bool,
    pub objects: u32,
}

#[derive(Default)]
struct S3State {
    buckets: HashMap<String, FakeBucket>,
    create_failure: Option<String>,
    delete_failure: Option<String>,
    invisible: bool,
    lingering: bool,
    creates: u32,
    deletes: u32,
}

/// [`BucketClient`] over an in-memory bucket table.
#[derive(Default)]
pub struct FakeS3 {
    state: Mutex<S3State>,
}

impl FakeS3 {
    pub fn location(name: &str) -> String {
        format!("http://{}.s3.amazonaws.com/", name)
    }

    pub fn insert(&self, name: &str, bucket: FakeBucket) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .insert(name.to_string(), bucket);
    }

    pub fn bucket(&self, name: &str) -> Option<FakeBucket> {
        self.state.lock().unwrap().buckets.get(name).cloned()
    }

    pub fn fail_create(&self, message: &str) {
        self.state.lock().unwrap().create_failure = Some(message.to_string());
    }

    pub fn fail_delete(&self, message: &str) {
        self.state.lock().unwrap().delete_failure = Some(message.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.create_failure = None;
        state.delete_failure = None;
    }

    /// Created buckets never show up in existence checks.
    pub fn make_invisible(&self) {
        self.state.lock().unwrap().invisible = true;
    }

    /// Deleted buckets keep showing up in existence checks.
    pub fn make_lingering(&self) {
        self.state.lock().unwrap().lingering = true;
    }

    pub fn set_objects(&self, name: &str, objects: u32) {
        if let Some(bucket) = self.state.lock().unwrap().buckets.get_mut(name) {
            bucket.objects = objects;
        }
    }

    pub fn creates(&self) -> u32 {
        self.state.lock().unwrap().creates
    }

    pub fn deletes(&self) -> u32 {
        self.state.lock().unwrap().deletes
    }
}

#[async_trait]
impl BucketClient for FakeS3 {
    async fn create(&self, name: &str, region: &str, locked: bool) -> Result<CreateOutcome> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        if let Some(message) = state.create_failure.clone() {
            return Err(OperatorError::ExternalResource(message));
        }
        if state.buckets.contains_key(name) {
            return Ok(CreateOutcome::AlreadyOwned {
                location: Self::location(name),
            });
        }
        state.buckets.insert(
            name.to_string(),
            FakeBucket {
                region: region.to_string(),
                locked,
                objects: 0,
            },
        );
        Ok(CreateOutcome::Created {
            location: Self::location(name),
        })
    }

    async fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        state.deletes += 1;
        if let Some(message) = state.delete_failure.clone() {
            return Err(OperatorError::ExternalResource(message));
        }
        match state.buckets.get(name) {
            None => Ok(DeleteOutcome::AlreadyGone),
            Some(bucket) if bucket.objects > 0 => Err(OperatorError::NonEmptyResource(format!(
                "bucket {} holds {} objects",
                name, bucket.objects
            ))),
            Some(_) => {
                if !state.lingering {
                    state.buckets.remove(name);
                }
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(!state.invisible && state.buckets.contains_key(name))
    }
}

/// Records every published event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(Severity, String, String)>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason, _)| reason.clone())
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(severity, _, _)| *severity == Severity::Warning)
            .count()
    }
}

impl EventSink for RecordingEvents {
    fn publish(&self, _bucket: &S3Bucket, severity: Severity, reason: &str, message: String) {
        self.events
            .lock()
            .unwrap()
            .push((severity, reason.to_string(), message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_follows_rfc_7386() {
        let mut target = json!({"state": "ERROR", "message": "taken", "conditions": [1, 2]});
        merge_json(
            &mut target,
            &json!({"state": "CREATED", "message": null, "conditions": [3]}),
        );
        assert_eq!(target, json!({"state": "CREATED", "conditions": [3]}));
    }

    #[test]
    fn test_merge_json_into_missing_status() {
        let mut target = Value::Null;
        merge_json(&mut target, &json!({"state": "CREATING", "message": null}));
        assert_eq!(target, json!({"state": "CREATING"}));
    }
}
