//! S3 bucket lifecycle calls.

use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Result of a create call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The bucket was created by this call
    Created { location: String },
    /// The bucket already existed and belongs to us
    AlreadyOwned { location: String },
}

impl CreateOutcome {
    pub fn location(&self) -> &str {
        match self {
            CreateOutcome::Created { location } | CreateOutcome::AlreadyOwned { location } => {
                location
            }
        }
    }
}

/// Result of a delete call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyGone,
}

/// Bucket lifecycle operations against the storage service.
///
/// `create` must report a bucket we already own as
/// [`CreateOutcome::AlreadyOwned`] rather than an error, and `delete` must
/// report a missing bucket as [`DeleteOutcome::AlreadyGone`]. The creation
/// and deletion workflows rely on both to resume after a crash.
#[async_trait]
pub trait BucketClient: Send + Sync {
    async fn create(&self, name: &str, region: &str, locked: bool) -> Result<CreateOutcome>;

    /// Fails with [`OperatorError::NonEmptyResource`] if the bucket holds objects.
    async fn delete(&self, name: &str) -> Result<DeleteOutcome>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Poll until the bucket is visible, failing with
    /// [`OperatorError::Timeout`] after `timeout`.
    async fn wait_until_exists(&self, name: &str, timeout: Duration, poll: Duration) -> Result<()> {
        wait_for_presence(self, name, true, timeout, poll).await
    }

    /// Poll until the bucket is gone, failing with
    /// [`OperatorError::Timeout`] after `timeout`.
    async fn wait_until_gone(&self, name: &str, timeout: Duration, poll: Duration) -> Result<()> {
        wait_for_presence(self, name, false, timeout, poll).await
    }
}

async fn wait_for_presence<C>(
    client: &C,
    name: &str,
    present: bool,
    timeout: Duration,
    poll: Duration,
) -> Result<()>
where
    C: BucketClient + ?Sized,
{
    let poll_loop = async {
        loop {
            match client.exists(name).await {
                Ok(found) if found == present => return,
                Ok(_) => debug!(bucket = %name, present, "Bucket not there yet"),
                Err(e) => warn!(bucket = %name, error = %e, "Existence check failed, polling again"),
            }
            tokio::time::sleep(poll).await;
        }
    };

    tokio::time::timeout(timeout, poll_loop).await.map_err(|_| {
        let wanted = if present { "exist" } else { "disappear" };
        OperatorError::Timeout(format!(
            "bucket {} did not {} within {:?}",
            name, wanted, timeout
        ))
    })
}

/// Connection settings for [`S3BucketClient`].
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    /// Region for the client; falls back to the AWS default chain
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores
    pub endpoint_url: Option<String>,
    /// Path-style addressing, needed by most S3-compatible stores
    pub force_path_style: bool,
}

/// [`BucketClient`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3BucketClient {
    client: aws_sdk_s3::Client,
}

impl S3BucketClient {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Build a client from the AWS default credential chain plus `settings`.
    pub async fn from_settings(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(settings.force_path_style);

        info!(
            region = ?settings.region,
            endpoint = ?settings.endpoint_url,
            "Initialized S3 client"
        );
        Self::new(aws_sdk_s3::Client::from_conf(builder.build()))
    }
}

fn location_configuration(region: &str) -> Option<CreateBucketConfiguration> {
    if region.is_empty() || region == DEFAULT_REGION {
        return None;
    }
    Some(
        CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build(),
    )
}

#[async_trait]
impl BucketClient for S3BucketClient {
    async fn create(&self, name: &str, region: &str, locked: bool) -> Result<CreateOutcome> {
        info!(bucket = %name, region = %region, locked, "Creating S3 bucket");
        let request = self
            .client
            .create_bucket()
            .bucket(name)
            .object_lock_enabled_for_bucket(locked)
            .set_create_bucket_configuration(location_configuration(region));

        match request.send().await {
            Ok(output) => Ok(CreateOutcome::Created {
                location: output
                    .location()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("/{}", name)),
            }),
            Err(err) => {
                if let Some(service) = err.as_service_error() {
                    if service.is_bucket_already_owned_by_you() {
                        info!(bucket = %name, "Bucket already exists and is owned by us");
                        return Ok(CreateOutcome::AlreadyOwned {
                            location: format!("/{}", name),
                        });
                    }
                    if service.is_bucket_already_exists() {
                        return Err(OperatorError::ExternalResource(format!(
                            "bucket name {} is taken by another account",
                            name
                        )));
                    }
                }
                Err(OperatorError::ExternalResource(format!(
                    "CreateBucket {} failed: {}",
                    name,
                    DisplayErrorContext(&err)
                )))
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<DeleteOutcome> {
        info!(bucket = %name, "Deleting S3 bucket");
        match self.client.delete_bucket().bucket(name).send().await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) => match err.code() {
                Some("NoSuchBucket") => {
                    info!(bucket = %name, "Bucket already deleted or never existed");
                    Ok(DeleteOutcome::AlreadyGone)
                }
                Some("BucketNotEmpty") => Err(OperatorError::NonEmptyResource(format!(
                    "bucket {} still holds objects",
                    name
                ))),
                _ => Err(OperatorError::ExternalResource(format!(
                    "DeleteBucket {} failed: {}",
                    name,
                    DisplayErrorContext(&err)
                ))),
            },
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(name).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Ok(false);
                }
                Err(OperatorError::ExternalResource(format!(
                    "HeadBucket {} failed: {}",
                    name,
                    DisplayErrorContext(&err)
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports the bucket as present from the `appears_after`-th check on.
    struct Appearing {
        checks: AtomicU32,
        appears_after: u32,
    }

    #[async_trait]
    impl BucketClient for Appearing {
        async fn create(&self, _: &str, _: &str, _: bool) -> Result<CreateOutcome> {
            unimplemented!()
        }

        async fn delete(&self, _: &str) -> Result<DeleteOutcome> {
            unimplemented!()
        }

        async fn exists(&self, _: &str) -> Result<bool> {
            let n = self.checks.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(n >= self.appears_after)
        }
    }

    #[test]
    fn test_us_east_1_has_no_location_constraint() {
        assert!(location_configuration("us-east-1").is_none());
        assert!(location_configuration("").is_none());
        let cfg = location_configuration("eu-west-1").unwrap();
        assert_eq!(
            cfg.location_constraint(),
            Some(&BucketLocationConstraint::EuWest1)
        );
    }

    #[test]
    fn test_create_outcome_location() {
        let outcome = CreateOutcome::AlreadyOwned {
            location: "/log-archive".to_string(),
        };
        assert_eq!(outcome.location(), "/log-archive");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_polls() {
        let client = Appearing {
            checks: AtomicU32::new(0),
            appears_after: 3,
        };
        client
            .wait_until_exists("b", Duration::from_secs(60), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(client.checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_times_out() {
        let client = Appearing {
            checks: AtomicU32::new(0),
            appears_after: u32::MAX,
        };
        let err = client
            .wait_until_exists("b", Duration::from_secs(12), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, OperatorError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_gone_returns_once_absent() {
        let client = Appearing {
            checks: AtomicU32::new(0),
            appears_after: u32::MAX,
        };
        client
            .wait_until_gone("b", Duration::from_secs(1), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(client.checks.load(Ordering::SeqCst), 1);
    }
}
