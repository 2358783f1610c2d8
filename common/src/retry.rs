//! Bounded retry applied uniformly at every network call site

use crate::shutdown::Shutdown;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// How a call site retries: attempts, fixed delay between attempts and the
/// timeout applied to each individual attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_delay_ms() -> u64 {
    2_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once(Duration::from_millis(default_timeout_ms()))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay_ms: delay.as_millis() as u64,
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Single best-effort attempt
    pub fn once(timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, timeout)
    }

    /// HTTP forward to the execution sink: 3 attempts, 2s apart, 5s each
    pub fn http_forward() -> Self {
        Self::new(3, Duration::from_secs(2), Duration::from_secs(5))
    }

    /// Durable queue push: 2 attempts, 2s apart, 3s each
    pub fn queue_push() -> Self {
        Self::new(2, Duration::from_secs(2), Duration::from_secs(3))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("{label} failed after {attempts} attempt(s): {source:#}")]
    Exhausted {
        label: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("{label} cancelled by shutdown after {attempts} attempt(s)")]
    Cancelled { label: String, attempts: u32 },
}

/// Run `op` until it succeeds, the policy's attempts are used up, or
/// shutdown is requested during a backoff sleep.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &Shutdown,
    label: &str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut shutdown = shutdown.clone();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout(), op()).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", policy.timeout())),
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            return Err(RetryError::Exhausted {
                label: label.to_string(),
                attempts: attempt,
                source: err,
            });
        }

        warn!(
            "{} attempt {}/{} failed: {:#}; retrying in {:?}",
            label,
            attempt,
            max_attempts,
            err,
            policy.delay()
        );

        if !shutdown.sleep(policy.delay()).await {
            return Err(RetryError::Cancelled {
                label: label.to_string(),
                attempts: attempt,
            });
        }
    }
}
