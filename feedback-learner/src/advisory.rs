// Advisory publishers
// Promotion advisories go out on one channel per consumer (generator, gate)

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::{AdvisoryChannel, UpstreamFeedback};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[async_trait]
pub trait AdvisoryPublisher: Send + Sync {
    async fn publish(&self, channel: AdvisoryChannel, advisory: &UpstreamFeedback) -> Result<()>;
}

/// Redis pub/sub, one topic per advisory channel
pub struct RedisAdvisoryPublisher {
    conn: ConnectionManager,
    generator_topic: String,
    gate_topic: String,
}

impl RedisAdvisoryPublisher {
    pub fn new(conn: ConnectionManager, generator_topic: impl Into<String>, gate_topic: impl Into<String>) -> Self {
        Self {
            conn,
            generator_topic: generator_topic.into(),
            gate_topic: gate_topic.into(),
        }
    }

    fn topic(&self, channel: AdvisoryChannel) -> &str {
        match channel {
            AdvisoryChannel::Generator => &self.generator_topic,
            AdvisoryChannel::Gate => &self.gate_topic,
        }
    }
}

#[async_trait]
impl AdvisoryPublisher for RedisAdvisoryPublisher {
    async fn publish(&self, channel: AdvisoryChannel, advisory: &UpstreamFeedback) -> Result<()> {
        let topic = self.topic(channel);
        let body = serde_json::to_string(advisory)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .publish(topic, body)
            .await
            .with_context(|| format!("PUBLISH {} failed", topic))?;
        debug!("Published advisory for {} on {}", advisory.key(), topic);
        Ok(())
    }
}

/// Forwards one channel's advisories to an in-process consumer
pub struct ChannelAdvisoryPublisher {
    channel: AdvisoryChannel,
    tx: mpsc::UnboundedSender<UpstreamFeedback>,
}

impl ChannelAdvisoryPublisher {
    pub fn new(channel: AdvisoryChannel) -> (Self, mpsc::UnboundedReceiver<UpstreamFeedback>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { channel, tx }, rx)
    }
}

#[async_trait]
impl AdvisoryPublisher for ChannelAdvisoryPublisher {
    async fn publish(&self, channel: AdvisoryChannel, advisory: &UpstreamFeedback) -> Result<()> {
        if channel == self.channel {
            self.tx
                .send(advisory.clone())
                .map_err(|_| anyhow::anyhow!("{:?} advisory consumer has gone away", channel))?;
        }
        Ok(())
    }
}

/// Publishes through every inner publisher; one failing does not stop the rest
#[derive(Default)]
pub struct CompositePublisher {
    publishers: Vec<Arc<dyn AdvisoryPublisher>>,
}

impl CompositePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_publisher(mut self, publisher: Arc<dyn AdvisoryPublisher>) -> Self {
        self.publishers.push(publisher);
        self
    }

    pub fn len(&self) -> usize {
        self.publishers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.publishers.is_empty()
    }
}

#[async_trait]
impl AdvisoryPublisher for CompositePublisher {
    async fn publish(&self, channel: AdvisoryChannel, advisory: &UpstreamFeedback) -> Result<()> {
        let mut failures = 0;
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(channel, advisory).await {
                warn!("Advisory publisher failed: {:#}", e);
                failures += 1;
            }
        }
        if failures > 0 {
            anyhow::bail!("{} of {} advisory publishers failed", failures, self.publishers.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{FeedbackRecord, Outcome};

    fn advisory() -> UpstreamFeedback {
        UpstreamFeedback {
            symbol: "EURUSD".to_string(),
            strategy: "momentum".to_string(),
            feedback: FeedbackRecord::first(Outcome::Win, "", Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_channel_publisher_filters_by_channel() {
        let (publisher, mut rx) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Gate);
        publisher.publish(AdvisoryChannel::Generator, &advisory()).await.unwrap();
        publisher.publish(AdvisoryChannel::Gate, &advisory()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().symbol, "EURUSD");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_composite_keeps_going_after_failure() {
        let (closed, rx) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Gate);
        drop(rx);
        let (open, mut open_rx) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Gate);
        let composite = CompositePublisher::new()
            .add_publisher(Arc::new(closed))
            .add_publisher(Arc::new(open));

        assert!(composite.publish(AdvisoryChannel::Gate, &advisory()).await.is_err());
        assert!(open_rx.try_recv().is_ok());
    }
}
