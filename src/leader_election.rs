//! Kubernetes Lease-based leader election for HA operator deployments.
//!
//! When several operator replicas run, only the holder of the Lease runs the
//! bucket controller. The others wait in [`LeaderElector::acquire`] until the
//! current holder releases the lease or stops renewing it.

use crate::error::{OperatorError, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta};
use kube::api::{Api, PostParams};
use kube::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LEASE_NAME: &str = "s3bucket-operator-leader";

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Timing of the lease protocol.
#[derive(Debug, Clone)]
pub struct LeaseSettings {
    pub name: String,
    /// How long a lease stays valid without renewal
    pub lease_duration: Duration,
    pub renew_interval: Duration,
    /// Wait between acquisition attempts while another replica leads
    pub retry_interval: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_LEASE_NAME.to_string(),
            lease_duration: Duration::from_secs(15),
            renew_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(5),
        }
    }
}

/// Namespace for the Lease: the explicit value, else the pod's own
/// namespace, else `default`.
pub fn detect_namespace(explicit: Option<&str>) -> String {
    if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
        return ns.to_string();
    }
    std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "default".to_string())
}

/// Whether a lease last renewed per `spec` has lapsed at `now`.
///
/// A lease that was never renewed counts as lapsed.
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>, fallback: Duration) -> bool {
    let Some(MicroTime(renewed)) = spec.and_then(|s| s.renew_time.as_ref()) else {
        return true;
    };
    let duration_secs = spec
        .and_then(|s| s.lease_duration_seconds)
        .map(i64::from)
        .unwrap_or(fallback.as_secs() as i64);
    now.signed_duration_since(*renewed).num_seconds() > duration_secs
}

fn holder(lease: &Lease) -> Option<&str> {
    lease.spec.as_ref().and_then(|s| s.holder_identity.as_deref())
}

/// Holds or waits for the operator's leader Lease.
///
/// Writes go through `replace`, which carries the Lease's `resourceVersion`,
/// so two replicas racing for the same Lease cannot both win.
pub struct LeaderElector {
    lease_api: Api<Lease>,
    identity: String,
    settings: LeaseSettings,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, settings: LeaseSettings) -> Self {
        let lease_api = Api::<Lease>::namespaced(client, namespace);
        let identity = std::env::var("POD_NAME")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("s3bucket-operator-{:08x}", rand::random::<u32>()));
        info!(identity = %identity, namespace = %namespace, lease = %settings.name, "Initialized leader elector");
        Self {
            lease_api,
            identity,
            settings,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn renew_interval(&self) -> Duration {
        self.settings.renew_interval
    }

    /// Blocks until this replica holds the lease.
    pub async fn acquire(&self) -> Result<()> {
        info!(identity = %self.identity, lease = %self.settings.name, "Waiting to acquire leader lease");
        loop {
            match self.try_acquire().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Acquired leader lease");
                    return Ok(());
                }
                Ok(false) => debug!("Lease held by another replica"),
                Err(e) => warn!(error = %e, "Lease acquisition failed"),
            }
            tokio::time::sleep(self.settings.retry_interval).await;
        }
    }

    /// Renews the lease. `Ok(false)` means leadership was lost.
    pub async fn renew(&self) -> Result<bool> {
        let Some(lease) = self.lease_api.get_opt(&self.settings.name).await? else {
            return Ok(false);
        };
        if holder(&lease) != Some(self.identity.as_str()) {
            return Ok(false);
        }

        let mut updated = lease;
        if let Some(spec) = updated.spec.as_mut() {
            spec.renew_time = Some(MicroTime(Utc::now()));
        }
        match self.replace(&updated).await {
            Ok(()) => {
                debug!("Renewed leader lease");
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                warn!("Lease changed underneath us during renewal, giving up leadership");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Clears the holder so a standby replica can take over without waiting
    /// for the lease to lapse.
    pub async fn release(&self) {
        let lease = match self.lease_api.get_opt(&self.settings.name).await {
            Ok(Some(lease)) => lease,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read lease for release");
                return;
            }
        };
        if holder(&lease) != Some(self.identity.as_str()) {
            debug!("Lease not held by us, skipping release");
            return;
        }

        let mut updated = lease;
        if let Some(spec) = updated.spec.as_mut() {
            spec.holder_identity = None;
        }
        match self.replace(&updated).await {
            Ok(()) => info!("Released leader lease"),
            Err(e) => warn!(error = %e, "Failed to release leader lease"),
        }
    }

    async fn try_acquire(&self) -> Result<bool> {
        let now = Utc::now();
        let Some(existing) = self.lease_api.get_opt(&self.settings.name).await? else {
            return self.create_lease(now).await;
        };

        let takeover = if holder(&existing) == Some(self.identity.as_str()) {
            false
        } else if lease_expired(existing.spec.as_ref(), now, self.settings.lease_duration) {
            true
        } else {
            return Ok(false);
        };

        let previous = existing.spec.as_ref();
        let transitions = previous.and_then(|s| s.lease_transitions).unwrap_or(0);
        let mut updated = existing.clone();
        updated.spec = Some(LeaseSpec {
            holder_identity: Some(self.identity.clone()),
            lease_duration_seconds: Some(self.lease_duration_secs()),
            acquire_time: if takeover {
                Some(MicroTime(now))
            } else {
                previous.and_then(|s| s.acquire_time.clone())
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(if takeover { transitions + 1 } else { transitions }),
            ..Default::default()
        });

        match self.replace(&updated).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_conflict() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_lease(&self, now: DateTime<Utc>) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.settings.name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.lease_duration_secs()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };
        match self.lease_api.create(&PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(e) => match OperatorError::from(e) {
                OperatorError::Conflict(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn replace(&self, lease: &Lease) -> Result<()> {
        self.lease_api
            .replace(&self.settings.name, &PostParams::default(), lease)
            .await?;
        Ok(())
    }

    fn lease_duration_secs(&self) -> i32 {
        i32::try_from(self.settings.lease_duration.as_secs()).unwrap_or(i32::MAX)
    }
}
