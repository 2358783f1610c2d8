//! Process configuration: optional TOML file layered under `SIGNAL_PLANE__*`
//! environment variables

use anyhow::{Context, Result};
use feedback_learner::LearnerConfig;
use serde::{Deserialize, Serialize};
use signal_router::RouterConfig;
use std::path::Path;
use strategy_gate::GateConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaneConfig {
    /// Redis for the ingress queue, durable queue destination, outcome stream,
    /// advisory channels and shared blacklist
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Fernet key for payload envelopes; plain JSON payloads when unset
    #[serde(default)]
    pub envelope_key: Option<String>,

    #[serde(default)]
    pub ingress: IngressConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub learner: LearnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressConfig {
    /// List popped for candidate signals
    #[serde(default = "default_ingress_key")]
    pub queue_key: String,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            queue_key: default_ingress_key(),
        }
    }
}

fn default_ingress_key() -> String {
    "strategy_gate:evaluation".to_string()
}

/// Load configuration; the file is optional, environment variables win
pub fn load_config(path: &Path) -> Result<PlaneConfig> {
    config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("SIGNAL_PLANE")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to read configuration from {}", path.display()))?
        .try_deserialize()
        .context("Invalid configuration")
}

/// Create a commented configuration file template
pub fn create_config_template(path: &Path) -> Result<()> {
    let template = r#"# Signal control plane configuration
# Every value can be overridden with SIGNAL_PLANE__<SECTION>__<KEY>

# Redis used for ingress, the durable queue, outcomes, advisories and the blacklist
# redis_url = "redis://127.0.0.1:6379/0"

# Fernet key for {payload} envelopes (url-safe base64, 32 bytes)
# envelope_key = ""

[ingress]
queue_key = "strategy_gate:evaluation"

[router]
# Seconds a signal digest is remembered
dedup_window_secs = 300
# Oldest accepted signal age at dequeue (seconds)
max_age_secs = 300
# Sleep when the queue is empty (milliseconds)
idle_ms = 1000
sweep_interval_secs = 60
# audit_log = "signal_audit.jsonl"

# [router.http]
# url = "http://127.0.0.1:8000/execute"
# retry = { max_attempts = 3, delay_ms = 2000, timeout_ms = 5000 }

# [router.queue]
# key = "signal_router:signals"
# retry = { max_attempts = 2, delay_ms = 2000, timeout_ms = 3000 }

[gate]
enabled = true
confidence_threshold = 0.75
# Consecutive rejections before a strategy is short-circuited
failure_limit = 2
# Adjustment assumed when the economic filter is unreachable
fail_closed_adjustment = -0.2
precision = 4
idle_ms = 1000
# failure_memory_path = "failure_memory.json"

[gate.economic_filter]
# url = "http://127.0.0.1:8001/filter"
retry = { max_attempts = 2, delay_ms = 1000, timeout_ms = 4000 }

[learner]
# store_path = "feedback_store.json"
inactivity_days = 10
interval_secs = 60
maintenance_interval_secs = 60
min_samples = 5
blacklist_below = 0.3
promote_above = 0.7
blacklist_ttl_days = 5
reconnect_delay_secs = 5

[learner.channels]
outcomes = "trade_feedback"
generator = "feedback:to:generator"
gate = "feedback:to:gate"
blacklist_prefix = "strategy:blacklist"
"#;

    std::fs::write(path, template)?;
    Ok(())
}
