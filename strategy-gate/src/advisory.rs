//! Latest promotion advisory per (symbol, strategy). Informational only; the
//! gate reports it but never changes a decision because of it.

use anyhow::{Context, Result};
use common::{Shutdown, StrategyKey, UpstreamFeedback};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct AdvisoryBoard {
    latest: DashMap<StrategyKey, UpstreamFeedback>,
}

impl AdvisoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, advisory: UpstreamFeedback) {
        debug!(
            "Advisory for {}: {} wins / {} losses",
            advisory.key(),
            advisory.feedback.wins,
            advisory.feedback.losses
        );
        self.latest.insert(advisory.key(), advisory);
    }

    /// Decode a raw advisory message and record it
    pub fn record_payload(&self, raw: &[u8]) -> Result<()> {
        let advisory: UpstreamFeedback =
            serde_json::from_slice(raw).context("Malformed advisory message")?;
        self.record(advisory);
        Ok(())
    }

    pub fn get(&self, key: &StrategyKey) -> Option<UpstreamFeedback> {
        self.latest.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Drain an in-process advisory channel until it closes or shutdown
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<UpstreamFeedback>, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                advisory = rx.recv() => match advisory {
                    Some(advisory) => self.record(advisory),
                    None => break,
                },
            }
        }
        info!("Advisory board stopped with {} entries", self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{FeedbackRecord, Outcome};

    fn advisory(wins: u64) -> UpstreamFeedback {
        let mut feedback = FeedbackRecord::first(Outcome::Win, "", Utc::now());
        feedback.wins = wins;
        UpstreamFeedback {
            symbol: "EURUSD".to_string(),
            strategy: "momentum".to_string(),
            feedback,
        }
    }

    #[test]
    fn test_keeps_latest_per_key() {
        let board = AdvisoryBoard::new();
        board.record(advisory(4));
        board.record(advisory(9));
        assert_eq!(board.len(), 1);
        let key = StrategyKey::new("EURUSD", "momentum");
        assert_eq!(board.get(&key).unwrap().feedback.wins, 9);
    }

    #[test]
    fn test_record_payload_rejects_garbage() {
        let board = AdvisoryBoard::new();
        assert!(board.record_payload(b"{not json").is_err());
        let raw = serde_json::to_vec(&advisory(5)).unwrap();
        board.record_payload(&raw).unwrap();
        assert_eq!(board.len(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let board = Arc::new(AdvisoryBoard::new());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(advisory(4)).unwrap();
        drop(tx);
        board.clone().run(rx, Shutdown::never()).await;
        assert_eq!(board.len(), 1);
    }
}
