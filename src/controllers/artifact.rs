//! The ConfigMap that describes a provisioned bucket.

use crate::clients::ObjectKey;
use crate::crd::S3Bucket;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "s3bucket-operator";
pub const BUCKET_LABEL: &str = "s3.acme.io/bucket";

pub fn config_map_name(bucket_object: &str) -> String {
    format!("{}-cm", bucket_object)
}

/// Key of the ConfigMap published for `bucket`.
pub fn config_map_key(bucket: &S3Bucket) -> ObjectKey {
    let owner = ObjectKey::from_resource(bucket);
    ObjectKey::new(owner.namespace, config_map_name(&owner.name))
}

fn owner_reference(bucket: &S3Bucket) -> OwnerReference {
    OwnerReference {
        api_version: S3Bucket::api_version(&()).to_string(),
        kind: S3Bucket::kind(&()).to_string(),
        name: bucket.name_any(),
        uid: bucket.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn labels(bucket: &S3Bucket) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels.insert(BUCKET_LABEL.to_string(), bucket.name_any());
    labels
}

/// Build the ConfigMap for a bucket that now exists at `location`.
///
/// The owner reference lets the garbage collector remove the ConfigMap
/// together with the `S3Bucket`.
pub fn build_config_map(bucket: &S3Bucket, location: &str) -> ConfigMap {
    let key = config_map_key(bucket);

    let mut data = BTreeMap::new();
    data.insert("BucketName".to_string(), bucket.spec.name.clone());
    data.insert("Region".to_string(), bucket.spec.region.clone());
    data.insert("Locked".to_string(), bucket.spec.locked.to_string());
    data.insert("location".to_string(), location.to_string());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(key.name),
            namespace: Some(key.namespace),
            labels: Some(labels(bucket)),
            owner_references: Some(vec![owner_reference(bucket)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
