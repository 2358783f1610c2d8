//! Learner-side sink for the failure/rejection events emitted by the router
//! and the gate. Events are logged and tallied per (symbol, strategy); they
//! do not feed the win/loss aggregates.

use common::{FeedbackEvent, FeedbackStatus, Shutdown, StrategyKey};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackTally {
    pub failed: u64,
    pub rejected: u64,
}

#[derive(Debug, Default)]
pub struct FeedbackInbox {
    tallies: DashMap<StrategyKey, FeedbackTally>,
}

impl FeedbackInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, event: &FeedbackEvent) -> FeedbackTally {
        let key = event.key();
        let tally = {
            let mut tally = self.tallies.entry(key.clone()).or_default();
            match event.status {
                FeedbackStatus::Failed => tally.failed += 1,
                FeedbackStatus::Rejected => tally.rejected += 1,
            }
            *tally
        };
        info!(
            "Pipeline feedback for {}: {:?} ({}) [{} failed / {} rejected]",
            key, event.status, event.reason, tally.failed, tally.rejected
        );
        tally
    }

    pub fn tally(&self, key: &StrategyKey) -> FeedbackTally {
        self.tallies.get(key).map(|t| *t).unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<StrategyKey, FeedbackTally> {
        self.tallies
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Drain the event channel until every sender is gone or shutdown
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<FeedbackEvent>, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        self.accept(&event);
                    }
                    None => break,
                },
            }
        }
        // Whatever was already queued still counts
        while let Ok(event) = rx.try_recv() {
            self.accept(&event);
        }
        info!("Feedback inbox stopped");
    }
}
