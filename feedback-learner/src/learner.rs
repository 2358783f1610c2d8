//! Adaptive Learner
//!
//! Periodically walks the feedback store. Records with enough samples are
//! judged on win rate: losers are blacklisted for a fixed horizon, winners are
//! announced to the signal source and the gate as advisory promotions. The
//! learner never touches another component's state directly.

use crate::advisory::AdvisoryPublisher;
use crate::config::LearnerConfig;
use crate::store::FeedbackStore;
use chrono::{DateTime, Duration, Utc};
use common::{AdvisoryChannel, BlacklistTable, FeedbackRecord, Shutdown, StrategyKey, UpstreamFeedback};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// Fewer samples than required; no judgement
    Insufficient { samples: u64 },
    Blacklist { win_rate: f64 },
    Promote { win_rate: f64 },
    Neutral { win_rate: f64 },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Insufficient { samples } => write!(f, "insufficient samples ({})", samples),
            Verdict::Blacklist { win_rate } => write!(f, "blacklist (win rate {:.2})", win_rate),
            Verdict::Promote { win_rate } => write!(f, "promote (win rate {:.2})", win_rate),
            Verdict::Neutral { win_rate } => write!(f, "no action (win rate {:.2})", win_rate),
        }
    }
}

/// Summary of one learning cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub blacklisted: Vec<StrategyKey>,
    pub promoted: Vec<StrategyKey>,
}

pub struct AdaptiveLearner {
    store: Arc<FeedbackStore>,
    blacklist: Arc<dyn BlacklistTable>,
    publisher: Arc<dyn AdvisoryPublisher>,
    min_samples: u64,
    blacklist_below: f64,
    promote_above: f64,
    blacklist_ttl: Duration,
    interval: std::time::Duration,
}

impl AdaptiveLearner {
    pub fn new(
        config: &LearnerConfig,
        store: Arc<FeedbackStore>,
        blacklist: Arc<dyn BlacklistTable>,
        publisher: Arc<dyn AdvisoryPublisher>,
    ) -> Self {
        Self {
            store,
            blacklist,
            publisher,
            min_samples: config.min_samples,
            blacklist_below: config.blacklist_below,
            promote_above: config.promote_above,
            blacklist_ttl: config.blacklist_ttl(),
            interval: config.interval(),
        }
    }

    pub fn evaluate(&self, record: &FeedbackRecord) -> Verdict {
        let samples = record.total();
        let win_rate = match record.win_rate() {
            Some(rate) if samples >= self.min_samples => rate,
            _ => return Verdict::Insufficient { samples },
        };
        if win_rate < self.blacklist_below {
            Verdict::Blacklist { win_rate }
        } else if win_rate > self.promote_above {
            Verdict::Promote { win_rate }
        } else {
            Verdict::Neutral { win_rate }
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        for (key, record) in self.store.snapshot() {
            let verdict = self.evaluate(&record);
            debug!("Learner verdict for {}: {}", key, verdict);
            match verdict {
                Verdict::Insufficient { .. } => {
                    report.skipped += 1;
                    continue;
                }
                Verdict::Blacklist { win_rate } => {
                    match self.blacklist.insert(&key, now, self.blacklist_ttl).await {
                        Ok(()) => {
                            warn!(
                                "Blacklisted {} for {} days (win rate {:.2} over {} outcomes)",
                                key,
                                self.blacklist_ttl.num_days(),
                                win_rate,
                                record.total()
                            );
                            report.blacklisted.push(key);
                        }
                        Err(e) => error!("Failed to blacklist {}: {:#}", key, e),
                    }
                }
                Verdict::Promote { win_rate } => {
                    let advisory = UpstreamFeedback {
                        symbol: key.symbol.clone(),
                        strategy: key.strategy.clone(),
                        feedback: record,
                    };
                    for channel in AdvisoryChannel::ALL {
                        if let Err(e) = self.publisher.publish(channel, &advisory).await {
                            error!("Failed to send {:?} advisory for {}: {:#}", channel, key, e);
                        }
                    }
                    info!("Promoted {} (win rate {:.2})", key, win_rate);
                    report.promoted.push(key);
                }
                Verdict::Neutral { .. } => {}
            }
            report.evaluated += 1;
        }

        report
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        info!("Adaptive learner started, evaluating every {:?}", self.interval);
        while shutdown.sleep(self.interval).await {
            let report = self.run_cycle(Utc::now()).await;
            info!(
                "Learning cycle: {} evaluated, {} skipped, {} blacklisted, {} promoted",
                report.evaluated,
                report.skipped,
                report.blacklisted.len(),
                report.promoted.len()
            );
        }
        info!("Adaptive learner stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::ChannelAdvisoryPublisher;
    use crate::advisory::CompositePublisher;
    use crate::blacklist::InMemoryBlacklist;
    use chrono::TimeZone;
    use common::Outcome;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        store: Arc<FeedbackStore>,
        blacklist: Arc<InMemoryBlacklist>,
        learner: AdaptiveLearner,
        generator_rx: tokio::sync::mpsc::UnboundedReceiver<UpstreamFeedback>,
        gate_rx: tokio::sync::mpsc::UnboundedReceiver<UpstreamFeedback>,
    }

    fn harness() -> Harness {
        let store = Arc::new(FeedbackStore::in_memory(Duration::days(10)));
        let blacklist = Arc::new(InMemoryBlacklist::new());
        let (generator, generator_rx) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Generator);
        let (gate, gate_rx) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Gate);
        let publisher = CompositePublisher::new()
            .add_publisher(Arc::new(generator))
            .add_publisher(Arc::new(gate));
        let learner = AdaptiveLearner::new(
            &LearnerConfig::default(),
            store.clone(),
            blacklist.clone(),
            Arc::new(publisher),
        );
        Harness {
            store,
            blacklist,
            learner,
            generator_rx,
            gate_rx,
        }
    }

    async fn seed(store: &FeedbackStore, symbol: &str, wins: u32, losses: u32) {
        for _ in 0..wins {
            store.record_at(symbol, "momentum", Outcome::Win, "", t0()).await;
        }
        for _ in 0..losses {
            store.record_at(symbol, "momentum", Outcome::Loss, "", t0()).await;
        }
    }

    #[tokio::test]
    async fn test_losing_strategy_is_blacklisted() {
        let mut h = harness();
        seed(&h.store, "EURUSD", 1, 4).await;

        let report = h.learner.run_cycle(t0()).await;
        let key = StrategyKey::new("EURUSD", "momentum");
        assert_eq!(report.blacklisted, vec![key.clone()]);
        assert!(report.promoted.is_empty());
        assert!(h.blacklist.contains(&key, t0() + Duration::days(4)).await.unwrap());
        assert_eq!(h.blacklist.expires_at(&key), Some(t0() + Duration::days(5)));
        assert!(h.generator_rx.try_recv().is_err());
        assert!(h.gate_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_winning_strategy_is_promoted_on_both_channels() {
        let mut h = harness();
        seed(&h.store, "EURUSD", 4, 1).await;

        let report = h.learner.run_cycle(t0()).await;
        assert_eq!(report.promoted, vec![StrategyKey::new("EURUSD", "momentum")]);
        assert!(report.blacklisted.is_empty());
        assert!(h.blacklist.is_empty());

        let to_generator = h.generator_rx.try_recv().unwrap();
        let to_gate = h.gate_rx.try_recv().unwrap();
        assert_eq!(to_generator, to_gate);
        assert_eq!((to_gate.feedback.wins, to_gate.feedback.losses), (4, 1));
    }

    #[tokio::test]
    async fn test_small_samples_and_middling_rates_untouched() {
        let h = harness();
        seed(&h.store, "EURUSD", 0, 4).await;
        seed(&h.store, "GBPUSD", 3, 3).await;

        let report = h.learner.run_cycle(t0()).await;
        assert_eq!(report.skipped, 1);
        assert_eq!(report.evaluated, 1);
        assert!(report.blacklisted.is_empty());
        assert!(report.promoted.is_empty());
        assert!(h.blacklist.is_empty());
    }

    #[test]
    fn test_thresholds_are_strict() {
        let h = harness();
        let mut record = FeedbackRecord::first(Outcome::Win, "", t0());
        record.wins = 7;
        record.losses = 3;
        assert_eq!(h.learner.evaluate(&record), Verdict::Neutral { win_rate: 0.7 });
        record.wins = 3;
        record.losses = 7;
        assert!(matches!(h.learner.evaluate(&record), Verdict::Neutral { .. }));
    }
}
