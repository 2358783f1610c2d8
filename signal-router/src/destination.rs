// Fan-out destinations
// Each destination owns its retry policy; failures surface as errors to the router

use anyhow::{bail, Context, Result};
use chrono::Utc;
use common::{call_with_retry, EnvelopeCodec, RetryPolicy, Shutdown, Signal};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// One independent delivery target of the fan-out
#[async_trait::async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one signal, retrying per the destination's own policy
    async fn deliver(&self, signal: &Signal, shutdown: &Shutdown) -> Result<()>;
}

/// Execution sink reached with `POST {payload}`; any non-2xx is a failure
pub struct HttpDestination {
    url: String,
    client: reqwest::Client,
    codec: EnvelopeCodec,
    policy: RetryPolicy,
}

impl HttpDestination {
    pub fn new(url: impl Into<String>, codec: EnvelopeCodec, policy: RetryPolicy) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            codec,
            policy,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait::async_trait]
impl Destination for HttpDestination {
    fn name(&self) -> &str {
        "http"
    }

    async fn deliver(&self, signal: &Signal, shutdown: &Shutdown) -> Result<()> {
        let envelope = self.codec.seal(signal)?;
        let (client, url, envelope) = (&self.client, self.url.as_str(), &envelope);
        call_with_retry(&self.policy, shutdown, "HTTP forward", || async move {
            let response = client
                .post(url)
                .json(envelope)
                .send()
                .await
                .with_context(|| format!("POST {} failed", url))?;
            let status = response.status();
            if !status.is_success() {
                bail!("execution sink answered {}", status);
            }
            Ok(())
        })
        .await?;
        Ok(())
    }
}

/// Durable queue: the sealed envelope is pushed onto a Redis list
pub struct RedisQueueDestination {
    key: String,
    conn: ConnectionManager,
    codec: EnvelopeCodec,
    policy: RetryPolicy,
}

impl RedisQueueDestination {
    pub fn new(conn: ConnectionManager, key: impl Into<String>, codec: EnvelopeCodec, policy: RetryPolicy) -> Self {
        Self {
            key: key.into(),
            conn,
            codec,
            policy,
        }
    }
}

#[async_trait::async_trait]
impl Destination for RedisQueueDestination {
    fn name(&self) -> &str {
        "queue"
    }

    async fn deliver(&self, signal: &Signal, shutdown: &Shutdown) -> Result<()> {
        let payload = serde_json::to_string(&self.codec.seal(signal)?)?;
        let key = self.key.as_str();
        call_with_retry(&self.policy, shutdown, "Queue push", || {
            let mut conn = self.conn.clone();
            let payload = payload.clone();
            async move {
                let _: () = conn
                    .rpush(key, payload)
                    .await
                    .with_context(|| format!("RPUSH {} failed", key))?;
                Ok(())
            }
        })
        .await?;
        Ok(())
    }
}

#[derive(Serialize)]
struct AuditLine<'a> {
    logged_at: chrono::DateTime<Utc>,
    signal: &'a Signal,
}

/// Append-only JSON-lines log, written once per signal without retry
pub struct AuditLogDestination {
    path: PathBuf,
    policy: RetryPolicy,
}

impl AuditLogDestination {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: RetryPolicy::once(Duration::from_secs(3)),
        }
    }
}

#[async_trait::async_trait]
impl Destination for AuditLogDestination {
    fn name(&self) -> &str {
        "audit_log"
    }

    async fn deliver(&self, signal: &Signal, shutdown: &Shutdown) -> Result<()> {
        let mut line = serde_json::to_vec(&AuditLine {
            logged_at: Utc::now(),
            signal,
        })?;
        line.push(b'\n');
        let (path, line) = (self.path.as_path(), line.as_slice());
        call_with_retry(&self.policy, shutdown, "Audit log write", || async move {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(line).await?;
            file.flush().await?;
            Ok(())
        })
        .await?;
        Ok(())
    }
}
