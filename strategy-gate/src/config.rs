//! Strategy gate configuration

use common::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Overall gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Run the gate in front of the scheduler. When disabled, ingress feeds
    /// the scheduler directly.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Minimum confidence after the economic adjustment
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Consecutive failures after which a strategy is short-circuited
    #[serde(default = "default_failure_limit")]
    pub failure_limit: u32,

    /// Adjustment assumed when the economic filter cannot be reached
    #[serde(default = "default_fail_closed_adjustment")]
    pub fail_closed_adjustment: f64,

    /// Decimal places kept on the adjusted confidence
    #[serde(default = "default_precision")]
    pub precision: u32,

    /// Where the failure memory is persisted; in-memory only when unset
    #[serde(default)]
    pub failure_memory_path: Option<PathBuf>,

    /// Sleep when the ingress source is empty or unreachable (milliseconds)
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,

    #[serde(default)]
    pub economic_filter: EconomicFilterConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            confidence_threshold: default_confidence_threshold(),
            failure_limit: default_failure_limit(),
            fail_closed_adjustment: default_fail_closed_adjustment(),
            precision: default_precision(),
            failure_memory_path: None,
            idle_ms: default_idle_ms(),
            economic_filter: EconomicFilterConfig::default(),
        }
    }
}

impl GateConfig {
    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_confidence_threshold() -> f64 {
    0.75
}

fn default_failure_limit() -> u32 {
    2
}

fn default_fail_closed_adjustment() -> f64 {
    -0.2
}

fn default_precision() -> u32 {
    4
}

fn default_idle_ms() -> u64 {
    1_000
}

/// External economic-context filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicFilterConfig {
    /// `POST` endpoint; when unset every signal passes unadjusted
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_filter_retry")]
    pub retry: RetryPolicy,
}

impl Default for EconomicFilterConfig {
    fn default() -> Self {
        Self {
            url: None,
            retry: default_filter_retry(),
        }
    }
}

fn default_filter_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert!(config.enabled);
        assert_eq!(config.confidence_threshold, 0.75);
        assert_eq!(config.failure_limit, 2);
        assert_eq!(config.fail_closed_adjustment, -0.2);
        assert_eq!(config.precision, 4);
        assert!(config.economic_filter.url.is_none());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: GateConfig =
            serde_json::from_str(r#"{"confidence_threshold": 0.8, "economic_filter": {"url": "http://filter"}}"#)
                .unwrap();
        assert_eq!(config.confidence_threshold, 0.8);
        assert_eq!(config.failure_limit, 2);
        assert_eq!(config.economic_filter.retry.max_attempts, 2);
        assert_eq!(config.economic_filter.url.as_deref(), Some("http://filter"));
    }
}
