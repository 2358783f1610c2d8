//! Router configuration

use common::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for the scheduler/router consumption loop and its destinations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// How long a signal digest is remembered (seconds)
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    /// Oldest `created_at` still accepted at dequeue time (seconds)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Sleep when the queue is empty (milliseconds)
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    /// How often stale dedup entries are swept (seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Execution sink reached over HTTP
    #[serde(default)]
    pub http: Option<HttpSinkConfig>,

    /// Durable queue the signal is pushed onto
    #[serde(default)]
    pub queue: Option<QueueSinkConfig>,

    /// Append-only audit log (JSON lines)
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: default_dedup_window_secs(),
            max_age_secs: default_max_age_secs(),
            idle_ms: default_idle_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
            http: None,
            queue: None,
            audit_log: None,
        }
    }
}

impl RouterConfig {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs as i64)
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_age_secs as i64)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_dedup_window_secs() -> u64 {
    300
}

fn default_max_age_secs() -> u64 {
    300
}

fn default_idle_ms() -> u64 {
    1_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSinkConfig {
    pub url: String,

    #[serde(default = "RetryPolicy::http_forward")]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSinkConfig {
    #[serde(default = "default_queue_key")]
    pub key: String,

    #[serde(default = "RetryPolicy::queue_push")]
    pub retry: RetryPolicy,
}

impl Default for QueueSinkConfig {
    fn default() -> Self {
        Self {
            key: default_queue_key(),
            retry: RetryPolicy::queue_push(),
        }
    }
}

fn default_queue_key() -> String {
    "signal_router:signals".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.dedup_window(), chrono::Duration::minutes(5));
        assert_eq!(config.max_age(), chrono::Duration::minutes(5));
        assert_eq!(config.idle(), Duration::from_secs(1));
        assert!(config.http.is_none());
    }

    #[test]
    fn test_sink_sections_fill_retry_defaults() {
        let config: RouterConfig = serde_json::from_str(
            r#"{"http": {"url": "http://localhost:9000/execute"}, "queue": {}}"#,
        )
        .unwrap();
        let http = config.http.unwrap();
        assert_eq!(http.retry, RetryPolicy::http_forward());
        let queue = config.queue.unwrap();
        assert_eq!(queue.key, "signal_router:signals");
        assert_eq!(queue.retry.max_attempts, 2);
        assert_eq!(config.dedup_window_secs, 300);
    }
}
