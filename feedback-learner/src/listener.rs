// Outcome Listener
// Subscribes to settled trade outcomes and records them in the feedback store

use crate::store::FeedbackStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{FeedbackRecord, OutcomeMessage, Shutdown};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("malformed outcome message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("outcome message has an empty {0}")]
    EmptyField(&'static str),
}

/// Source of raw outcome payloads. Each call opens a fresh subscription; the
/// returned stream ends when the subscription drops.
#[async_trait]
pub trait OutcomeStream: Send + Sync {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>>;
}

/// Redis pub/sub channel
pub struct RedisOutcomeStream {
    client: redis::Client,
    channel: String,
}

impl RedisOutcomeStream {
    pub fn new(client: redis::Client, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl OutcomeStream for RedisOutcomeStream {
    async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .context("Failed to open pub/sub connection")?;
        pubsub
            .subscribe(&self.channel)
            .await
            .with_context(|| format!("SUBSCRIBE {} failed", self.channel))?;
        info!("Subscribed to outcome channel {}", self.channel);
        Ok(pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .boxed())
    }
}

pub struct OutcomeListener {
    store: Arc<FeedbackStore>,
    stream: Arc<dyn OutcomeStream>,
    reconnect_delay: Duration,
}

impl OutcomeListener {
    pub fn new(store: Arc<FeedbackStore>, stream: Arc<dyn OutcomeStream>, reconnect_delay: Duration) -> Self {
        Self {
            store,
            stream,
            reconnect_delay,
        }
    }

    /// Parse one message and record it
    pub async fn handle_payload(&self, raw: &[u8]) -> Result<FeedbackRecord, ListenerError> {
        let message: OutcomeMessage = serde_json::from_slice(raw)?;
        if message.symbol.trim().is_empty() {
            return Err(ListenerError::EmptyField("symbol"));
        }
        if message.strategy.trim().is_empty() {
            return Err(ListenerError::EmptyField("strategy"));
        }
        Ok(self
            .store
            .record(&message.symbol, &message.strategy, message.outcome, &message.reason)
            .await)
    }

    /// Consume outcomes until shutdown, resubscribing whenever the stream
    /// drops or cannot be opened
    pub async fn run(self, mut shutdown: Shutdown) {
        while !shutdown.is_triggered() {
            let mut messages = match self.stream.subscribe().await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!("Outcome stream unavailable: {:#}", e);
                    if !shutdown.sleep(self.reconnect_delay).await {
                        break;
                    }
                    continue;
                }
            };

            loop {
                let next = tokio::select! {
                    _ = shutdown.wait() => None,
                    next = messages.next() => next,
                };
                let Some(raw) = next else {
                    break;
                };
                match self.handle_payload(&raw).await {
                    Ok(record) => debug!("Outcome recorded ({} wins / {} losses)", record.wins, record.losses),
                    Err(e) => warn!("Dropping outcome message: {}", e),
                }
            }

            if shutdown.is_triggered() {
                break;
            }
            warn!("Outcome stream disconnected, resubscribing in {:?}", self.reconnect_delay);
            if !shutdown.sleep(self.reconnect_delay).await {
                break;
            }
        }
        info!("Outcome listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::{shutdown_channel, Outcome, StrategyKey};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Each subscription replays the next scripted batch, then ends
    struct ScriptedStream {
        batches: Mutex<VecDeque<Vec<&'static str>>>,
        subscriptions: Mutex<usize>,
    }

    impl ScriptedStream {
        fn new(batches: Vec<Vec<&'static str>>) -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(batches.into()),
                subscriptions: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl OutcomeStream for ScriptedStream {
        async fn subscribe(&self) -> Result<BoxStream<'static, Vec<u8>>> {
            *self.subscriptions.lock().unwrap() += 1;
            match self.batches.lock().unwrap().pop_front() {
                Some(batch) => Ok(futures::stream::iter(
                    batch.into_iter().map(|m| m.as_bytes().to_vec()).collect::<Vec<_>>(),
                )
                .boxed()),
                None => Ok(futures::stream::pending::<Vec<u8>>().boxed()),
            }
        }
    }

    fn store() -> Arc<FeedbackStore> {
        Arc::new(FeedbackStore::in_memory(ChronoDuration::days(10)))
    }

    #[tokio::test]
    async fn test_handle_payload_records_and_rejects() {
        let store = store();
        let listener = OutcomeListener::new(store.clone(), ScriptedStream::new(vec![]), Duration::from_millis(1));

        let record = listener
            .handle_payload(br#"{"symbol":"EURUSD","strategy":"momentum","outcome":"win"}"#)
            .await
            .unwrap();
        assert_eq!(record.wins, 1);

        assert!(matches!(
            listener.handle_payload(b"not json").await,
            Err(ListenerError::Malformed(_))
        ));
        assert!(matches!(
            listener
                .handle_payload(br#"{"symbol":"","strategy":"momentum","outcome":"loss"}"#)
                .await,
            Err(ListenerError::EmptyField("symbol"))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_survives_malformed_messages_and_disconnects() {
        let store = store();
        let stream = ScriptedStream::new(vec![
            vec![
                r#"{"symbol":"EURUSD","strategy":"momentum","outcome":"win"}"#,
                "{garbage",
                r#"{"symbol":"EURUSD","strategy":"momentum","outcome":"draw"}"#,
            ],
            vec![r#"{"symbol":"EURUSD","strategy":"momentum","outcome":"loss","reason":"stoploss"}"#],
        ]);
        let listener = OutcomeListener::new(store.clone(), stream.clone(), Duration::from_millis(1));

        let (trigger, shutdown) = shutdown_channel();
        let handle = tokio::spawn(listener.run(shutdown));
        let key = StrategyKey::new("EURUSD", "momentum");
        for _ in 0..200 {
            if store.get(&key).map(|r| r.total()) == Some(2) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        trigger.trigger();
        handle.await.unwrap();

        let record = store.get(&key).unwrap();
        assert_eq!((record.wins, record.losses), (1, 1));
        assert_eq!(record.last_outcome, Outcome::Loss);
        assert_eq!(record.reason, "stoploss");
        assert!(*stream.subscriptions.lock().unwrap() >= 2);
    }
}
