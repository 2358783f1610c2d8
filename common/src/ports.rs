//! Seams between components and their external collaborators

use crate::feedback::{FeedbackEvent, StrategyKey};
use crate::signal::Signal;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Destination for feedback events headed to the learner.
///
/// Reporting is fire-and-forget: it never blocks and never fails the caller's
/// own state transition.
pub trait FeedbackReporter: Send + Sync {
    fn report(&self, event: FeedbackEvent);
}

/// In-process reporter backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<FeedbackEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FeedbackEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FeedbackReporter for ChannelReporter {
    fn report(&self, event: FeedbackEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(
                "Feedback inbox closed, dropping {:?} event for {}",
                e.0.status,
                e.0.key()
            );
        }
    }
}

/// Anything that accepts a confirmed signal for further processing
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn submit(&self, signal: Signal) -> anyhow::Result<()>;
}

#[derive(Debug, Error)]
pub enum IngressError {
    /// The message could not be decoded; drop it and move on
    #[error("malformed signal payload: {0:#}")]
    Malformed(anyhow::Error),
    /// The source itself is unreachable; back off before polling again
    #[error("signal source unavailable: {0:#}")]
    Transport(anyhow::Error),
}

/// Producer of candidate signals. `Ok(None)` means nothing is pending.
#[async_trait]
pub trait SignalSource: Send {
    async fn poll(&mut self) -> Result<Option<Vec<Signal>>, IngressError>;
}

/// Time-bounded (symbol, strategy) blacklist
#[async_trait]
pub trait BlacklistTable: Send + Sync {
    /// Create or refresh an entry that lapses `ttl` after `now`
    async fn insert(&self, key: &StrategyKey, now: DateTime<Utc>, ttl: Duration) -> anyhow::Result<()>;

    async fn contains(&self, key: &StrategyKey, now: DateTime<Utc>) -> anyhow::Result<bool>;
}
