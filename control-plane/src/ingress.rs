// Signal ingress
// Pops candidate signals from a Redis list and hands them on

use async_trait::async_trait;
use common::{EnvelopeCodec, IngressError, Shutdown, Signal, SignalSink, SignalSource};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One LPOP per poll; each entry is a signal object or an envelope
pub struct RedisQueueSource {
    conn: ConnectionManager,
    key: String,
    codec: EnvelopeCodec,
}

impl RedisQueueSource {
    pub fn new(conn: ConnectionManager, key: impl Into<String>, codec: EnvelopeCodec) -> Self {
        Self {
            conn,
            key: key.into(),
            codec,
        }
    }
}

#[async_trait]
impl SignalSource for RedisQueueSource {
    async fn poll(&mut self) -> Result<Option<Vec<Signal>>, IngressError> {
        let raw: Option<Vec<u8>> = self
            .conn
            .lpop(&self.key, None)
            .await
            .map_err(|e| IngressError::Transport(e.into()))?;

        match raw {
            None => Ok(None),
            Some(raw) => self.codec.decode(&raw).map(Some).map_err(IngressError::Malformed),
        }
    }
}

/// Forward everything a source yields straight into a sink. Used when the
/// strategy gate is disabled.
pub async fn pump<S: SignalSource>(mut source: S, sink: Arc<dyn SignalSink>, idle: Duration, mut shutdown: Shutdown) {
    info!("Ingress pump started (strategy gate disabled)");

    // A poll in flight is allowed to finish; shutdown is checked between polls
    while !shutdown.is_triggered() {
        match source.poll().await {
            Ok(Some(signals)) => {
                for signal in signals {
                    let symbol = signal.symbol.clone();
                    if let Err(e) = sink.submit(signal).await {
                        error!("Failed to enqueue {}: {:#}", symbol, e);
                    }
                }
            }
            Ok(None) => {
                if !shutdown.sleep(idle).await {
                    break;
                }
            }
            Err(IngressError::Malformed(e)) => warn!("Dropping malformed ingress message: {:#}", e),
            Err(e @ IngressError::Transport(_)) => {
                warn!("{}", e);
                if !shutdown.sleep(idle).await {
                    break;
                }
            }
        }
    }

    info!("Ingress pump stopped");
}
