//! Learner configuration

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerConfig {
    /// Feedback store snapshot; in-memory only when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,

    /// Records untouched for this many days are purged
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: i64,

    /// Seconds between learning cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Seconds between purge/sweep maintenance runs
    #[serde(default = "default_maintenance_secs")]
    pub maintenance_interval_secs: u64,

    /// Records with fewer outcomes are left alone
    #[serde(default = "default_min_samples")]
    pub min_samples: u64,

    #[serde(default = "default_blacklist_below")]
    pub blacklist_below: f64,

    #[serde(default = "default_promote_above")]
    pub promote_above: f64,

    #[serde(default = "default_blacklist_ttl_days")]
    pub blacklist_ttl_days: i64,

    /// Seconds to wait before resubscribing to the outcome stream
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_delay_secs: u64,

    #[serde(default)]
    pub channels: ChannelConfig,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            inactivity_days: default_inactivity_days(),
            interval_secs: default_interval_secs(),
            maintenance_interval_secs: default_maintenance_secs(),
            min_samples: default_min_samples(),
            blacklist_below: default_blacklist_below(),
            promote_above: default_promote_above(),
            blacklist_ttl_days: default_blacklist_ttl_days(),
            reconnect_delay_secs: default_reconnect_secs(),
            channels: ChannelConfig::default(),
        }
    }
}

impl LearnerConfig {
    pub fn inactivity(&self) -> ChronoDuration {
        ChronoDuration::days(self.inactivity_days)
    }

    pub fn blacklist_ttl(&self) -> ChronoDuration {
        ChronoDuration::days(self.blacklist_ttl_days)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_inactivity_days() -> i64 {
    10
}

fn default_interval_secs() -> u64 {
    60
}

fn default_maintenance_secs() -> u64 {
    60
}

fn default_min_samples() -> u64 {
    5
}

fn default_blacklist_below() -> f64 {
    0.3
}

fn default_promote_above() -> f64 {
    0.7
}

fn default_blacklist_ttl_days() -> i64 {
    5
}

fn default_reconnect_secs() -> u64 {
    5
}

/// Redis channel and key names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_outcome_channel")]
    pub outcomes: String,

    #[serde(default = "default_generator_channel")]
    pub generator: String,

    #[serde(default = "default_gate_channel")]
    pub gate: String,

    #[serde(default = "default_blacklist_prefix")]
    pub blacklist_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            outcomes: default_outcome_channel(),
            generator: default_generator_channel(),
            gate: default_gate_channel(),
            blacklist_prefix: default_blacklist_prefix(),
        }
    }
}

fn default_outcome_channel() -> String {
    "trade_feedback".to_string()
}

fn default_generator_channel() -> String {
    common::AdvisoryChannel::Generator.default_topic().to_string()
}

fn default_gate_channel() -> String {
    common::AdvisoryChannel::Gate.default_topic().to_string()
}

fn default_blacklist_prefix() -> String {
    "strategy:blacklist".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LearnerConfig::default();
        assert_eq!(config.inactivity(), ChronoDuration::days(10));
        assert_eq!(config.blacklist_ttl(), ChronoDuration::days(5));
        assert_eq!(config.interval(), Duration::from_secs(60));
        assert_eq!(config.min_samples, 5);
        assert_eq!(config.channels.gate, "feedback:to:gate");
        assert_eq!(config.channels.outcomes, "trade_feedback");
    }
}
