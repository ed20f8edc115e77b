//! Retry-on-conflict combinator
//!
//! Status and finalizer writes are guarded by `resourceVersion`. When another
//! writer gets in first, the whole read-modify-write cycle is repeated under
//! a bounded exponential backoff. The combinator knows nothing about buckets:
//! callers hand it a closure that fetches the latest object, computes the
//! new value and writes it.

use crate::error::{OperatorError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Exponential backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Total number of attempts
    pub steps: u32,
    /// Delay after the first failed attempt
    pub duration: Duration,
    /// Multiplier applied to the delay after every attempt
    pub factor: f64,
    /// Up to this fraction of the delay is added at random
    pub jitter: f64,
    /// Delays never grow past this
    pub cap: Option<Duration>,
}

impl Default for Backoff {
    /// 4 attempts, 10ms growing ×5 with 10% jitter.
    fn default() -> Self {
        Self {
            steps: 4,
            duration: Duration::from_millis(10),
            factor: 5.0,
            jitter: 0.1,
            cap: None,
        }
    }
}

impl Backoff {
    /// Same shape as the default with a different attempt budget.
    pub fn with_steps(steps: u32) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    /// Delay to sleep after failed attempt `attempt` (zero-based), before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let scaled = self.duration.as_nanos() as f64 * self.factor.powi(attempt as i32);
        let delay = Duration::from_nanos(scaled.max(0.0).round() as u64);
        match self.cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..self.jitter);
        base + base.mul_f64(extra)
    }
}

/// Run `op` until it succeeds, fails with something other than a conflict,
/// or the backoff runs out of steps. The last conflict is returned when the
/// budget is exhausted.
pub async fn retry_on_conflict<T, F, Fut>(backoff: &Backoff, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let steps = backoff.steps.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Err(OperatorError::Conflict(msg)) => {
                attempt += 1;
                if attempt >= steps {
                    return Err(OperatorError::Conflict(format!(
                        "gave up after {} attempts: {}",
                        steps, msg
                    )));
                }
                let delay = backoff.delay(attempt - 1);
                debug!(attempt, ?delay, "write conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }
}
