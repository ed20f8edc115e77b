//! S3Bucket Kubernetes Operator
//!
//! Provisions S3 buckets for `S3Bucket` resources.
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig and AWS credentials)
//! s3bucket-operator
//!
//! # Watch a single namespace against a local S3-compatible store
//! s3bucket-operator --namespace storage \
//!     --s3-endpoint http://localhost:9000 --force-path-style
//!
//! # Run with custom log level
//! RUST_LOG=debug s3bucket-operator
//! ```

use clap::Parser;
use kube::Client;
use s3bucket_operator::leader_election::{self, LeaderElector, LeaseSettings};
use s3bucket_operator::retry::Backoff;
use s3bucket_operator::{
    BucketController, BucketReconciler, KubeBucketStore, KubeEventSink, ReconcilerConfig,
    S3BucketClient, S3Settings,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CONTROLLER_NAME: &str = "s3bucket-operator";

/// S3Bucket Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "s3bucket-operator")]
#[command(version, about = "Kubernetes Operator for S3 buckets")]
struct Args {
    /// Namespace to watch (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Enable leader election for HA deployments
    #[arg(long, env = "LEADER_ELECTION", default_value_t = false)]
    leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected when unset)
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE")]
    leader_election_namespace: Option<String>,

    /// AWS region for the S3 client (AWS default chain when unset)
    #[arg(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    /// S3 endpoint override, for S3-compatible stores
    #[arg(long, env = "S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long, env = "S3_FORCE_PATH_STYLE", default_value_t = false)]
    force_path_style: bool,

    /// Seconds to wait for a bucket to appear or disappear
    #[arg(long, env = "BUCKET_WAIT_TIMEOUT_SECS", default_value_t = 120)]
    wait_timeout_secs: u64,

    /// Seconds between existence checks while waiting
    #[arg(
        long,
        env = "BUCKET_POLL_INTERVAL_SECS",
        default_value_t = 5,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_secs: u64,

    /// Seconds before a bucket in ERROR is looked at again
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 300)]
    error_requeue_secs: u64,

    /// Seconds before a bucket caught mid-transition is looked at again
    #[arg(long, env = "TRANSITIONAL_REQUEUE_SECS", default_value_t = 30)]
    transitional_requeue_secs: u64,

    /// Attempts for a status or finalizer write that keeps conflicting
    #[arg(long, env = "CONFLICT_RETRY_STEPS", default_value_t = 4)]
    conflict_retry_steps: u32,
}

impl Args {
    fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            error_requeue: Duration::from_secs(self.error_requeue_secs),
            transitional_requeue: Duration::from_secs(self.transitional_requeue_secs),
            wait_timeout: Duration::from_secs(self.wait_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            conflict_backoff: Backoff::with_steps(self.conflict_retry_steps),
        }
    }

    fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.aws_region.clone(),
            endpoint_url: self.s3_endpoint.clone(),
            force_path_style: self.force_path_style,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting S3Bucket Kubernetes Operator");
    info!("Leader election: {}", args.leader_election);
    info!(
        "Watching namespace: {}",
        args.namespace.as_deref().unwrap_or("all")
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let elector = if args.leader_election {
        let ns = leader_election::detect_namespace(args.leader_election_namespace.as_deref());
        info!("Leader election namespace: {}", ns);
        let elector = LeaderElector::new(client.clone(), &ns, LeaseSettings::default());
        elector.acquire().await?;
        Some(Arc::new(elector))
    } else {
        None
    };

    let s3 = S3BucketClient::from_settings(&args.s3_settings()).await;
    let events = KubeEventSink::new(
        client.clone(),
        CONTROLLER_NAME,
        elector.as_ref().map(|e| e.identity().to_string()),
    );
    let reconciler = BucketReconciler::new(
        Arc::new(KubeBucketStore::new(client.clone())),
        Arc::new(s3),
        Arc::new(events),
        args.reconciler_config(),
    );
    let controller = Arc::new(BucketController::new(
        client.clone(),
        reconciler,
        args.namespace.clone(),
    ));

    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("S3Bucket controller error: {}", e);
        }
    });

    // Periodic lease renewal (never completes when leader election is disabled)
    let elector_for_renew = elector.clone();
    let renew_handle = tokio::spawn(async move {
        match elector_for_renew {
            Some(e) => loop {
                tokio::time::sleep(e.renew_interval()).await;
                match e.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Lost leader lease");
                        break;
                    }
                    Err(err) => {
                        error!("Failed to renew leader lease: {}", err);
                        break;
                    }
                }
            },
            None => std::future::pending::<()>().await,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = controller_handle => {
            if let Err(e) = result {
                error!("S3Bucket controller task failed: {}", e);
            }
        }
        _ = renew_handle => {
            error!("Leader lease lost, initiating shutdown");
        }
    }

    if let Some(e) = &elector {
        e.release().await;
    }

    info!("S3Bucket Operator shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reconciler_policy() {
        let args = Args::parse_from(["s3bucket-operator"]);
        let config = args.reconciler_config();
        let defaults = ReconcilerConfig::default();

        assert_eq!(config.error_requeue, defaults.error_requeue);
        assert_eq!(config.transitional_requeue, defaults.transitional_requeue);
        assert_eq!(config.wait_timeout, defaults.wait_timeout);
        assert_eq!(config.poll_interval, defaults.poll_interval);
        assert_eq!(config.conflict_backoff, defaults.conflict_backoff);
    }

    #[test]
    fn test_s3_settings_from_flags() {
        let args = Args::parse_from([
            "s3bucket-operator",
            "--s3-endpoint",
            "http://localhost:9000",
            "--force-path-style",
            "--aws-region",
            "eu-west-1",
        ]);
        let settings = args.s3_settings();
        assert_eq!(settings.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(settings.region.as_deref(), Some("eu-west-1"));
        assert!(settings.force_path_style);
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let result = Args::try_parse_from(["s3bucket-operator", "--poll-interval-secs", "0"]);
        assert!(result.is_err());

        let args =
            Args::try_parse_from(["s3bucket-operator", "--poll-interval-secs", "1"]).unwrap();
        assert_eq!(args.reconciler_config().poll_interval, Duration::from_secs(1));
    }
}
