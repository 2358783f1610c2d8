//! Strategy gate state machine
//!
//! Each signal ends in exactly one of two states:
//! - ROUTED: handed to the scheduler with its adjusted confidence, and the
//!   strategy's failure memory is cleared
//! - REJECTED: reported as feedback, with failure memory incremented for
//!   economic blocks and low confidence
//!
//! Checks run in order: failure memory, learner blacklist, economic filter,
//! confidence threshold.

use crate::advisory::AdvisoryBoard;
use crate::config::GateConfig;
use crate::economic::{EconomicFilter, EconomicVerdict};
use crate::failure_memory::FailureMemory;
use common::{
    BlacklistTable, FeedbackEvent, FeedbackReporter, IngressError, Shutdown, Signal, SignalSink, SignalSource,
    StrategyKey,
};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why the gate turned a signal down
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    PreviouslyFailed { failures: u32 },
    Blacklisted,
    EconomicBlock,
    LowConfidence { confidence: f64, threshold: f64 },
    /// Passed every check but could not be handed to the scheduler
    ForwardFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::PreviouslyFailed { .. } => write!(f, "strategy previously failed"),
            RejectReason::Blacklisted => write!(f, "strategy blacklisted"),
            RejectReason::EconomicBlock => write!(f, "blocked by economic filter"),
            RejectReason::LowConfidence { .. } => write!(f, "confidence too low after adjustment"),
            RejectReason::ForwardFailed => write!(f, "forward failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Carries the signal as forwarded, with adjusted confidence
    Routed(Signal),
    Rejected(RejectReason),
}

impl GateDecision {
    pub fn is_routed(&self) -> bool {
        matches!(self, GateDecision::Routed(_))
    }
}

pub struct StrategyGate {
    config: GateConfig,
    memory: Arc<FailureMemory>,
    filter: Arc<dyn EconomicFilter>,
    sink: Arc<dyn SignalSink>,
    reporter: Arc<dyn FeedbackReporter>,
    blacklist: Option<Arc<dyn BlacklistTable>>,
    advisories: Arc<AdvisoryBoard>,
}

impl StrategyGate {
    pub fn new(
        config: GateConfig,
        memory: Arc<FailureMemory>,
        filter: Arc<dyn EconomicFilter>,
        sink: Arc<dyn SignalSink>,
        reporter: Arc<dyn FeedbackReporter>,
    ) -> Self {
        Self {
            config,
            memory,
            filter,
            sink,
            reporter,
            blacklist: None,
            advisories: Arc::new(AdvisoryBoard::new()),
        }
    }

    /// Consult the learner's blacklist as an extra short-circuit
    pub fn with_blacklist(mut self, blacklist: Arc<dyn BlacklistTable>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    pub fn with_advisories(mut self, advisories: Arc<AdvisoryBoard>) -> Self {
        self.advisories = advisories;
        self
    }

    pub fn memory(&self) -> &FailureMemory {
        &self.memory
    }

    pub async fn evaluate(&self, signal: Signal) -> GateDecision {
        let strategy = signal.strategy.clone();

        let failures = self.memory.failures(&strategy);
        if failures >= self.config.failure_limit {
            return self.reject(signal, RejectReason::PreviouslyFailed { failures });
        }

        if self.is_blacklisted(&signal).await {
            return self.reject(signal, RejectReason::Blacklisted);
        }

        let verdict = match self.filter.assess(&signal).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    symbol = %signal.symbol,
                    strategy = %strategy,
                    "Economic filter unavailable, failing closed: {:#}", e
                );
                EconomicVerdict::block(self.config.fail_closed_adjustment)
            }
        };

        if !verdict.pass {
            self.memory.record_failure(&strategy).await;
            return self.reject(signal, RejectReason::EconomicBlock);
        }

        let adjusted = signal.with_adjusted_confidence(verdict.adjustment, self.config.precision);
        if adjusted.confidence < self.config.confidence_threshold {
            self.memory.record_failure(&strategy).await;
            let reason = RejectReason::LowConfidence {
                confidence: adjusted.confidence,
                threshold: self.config.confidence_threshold,
            };
            return self.reject(adjusted, reason);
        }

        if let Err(e) = self.sink.submit(adjusted.clone()).await {
            error!(
                symbol = %adjusted.symbol,
                strategy = %strategy,
                "Failed to forward signal: {:#}", e
            );
            self.reporter
                .report(FeedbackEvent::failed(adjusted, format!("{}: {:#}", RejectReason::ForwardFailed, e)));
            return GateDecision::Rejected(RejectReason::ForwardFailed);
        }

        self.memory.clear(&strategy).await;

        let key = StrategyKey::new(&adjusted.symbol, &strategy);
        match self.advisories.get(&key) {
            Some(advisory) => info!(
                symbol = %adjusted.symbol,
                strategy = %strategy,
                confidence = adjusted.confidence,
                wins = advisory.feedback.wins,
                losses = advisory.feedback.losses,
                "Signal routed (strategy promoted)"
            ),
            None => info!(
                symbol = %adjusted.symbol,
                strategy = %strategy,
                confidence = adjusted.confidence,
                "Signal routed"
            ),
        }
        GateDecision::Routed(adjusted)
    }

    /// A blacklist that cannot be read does not block the signal
    async fn is_blacklisted(&self, signal: &Signal) -> bool {
        let Some(blacklist) = &self.blacklist else {
            return false;
        };
        let key = StrategyKey::new(&signal.symbol, &signal.strategy);
        match blacklist.contains(&key, Utc::now()).await {
            Ok(listed) => listed,
            Err(e) => {
                warn!("Blacklist lookup failed for {}, admitting: {:#}", key, e);
                false
            }
        }
    }

    fn reject(&self, signal: Signal, reason: RejectReason) -> GateDecision {
        info!(
            symbol = %signal.symbol,
            strategy = %signal.strategy,
            confidence = signal.confidence,
            reason = %reason,
            "Signal rejected"
        );
        if let RejectReason::LowConfidence { confidence, threshold } = &reason {
            debug!("Adjusted confidence {:.4} below {:.4}", confidence, threshold);
        }
        self.reporter
            .report(FeedbackEvent::rejected(signal, reason.to_string()));
        GateDecision::Rejected(reason)
    }
}

/// Standalone evaluation loop: poll the ingress source, evaluate each signal
pub struct GateLoop {
    gate: Arc<StrategyGate>,
}

impl GateLoop {
    pub fn new(gate: Arc<StrategyGate>) -> Self {
        Self { gate }
    }

    pub async fn run<S: SignalSource>(self, mut source: S, mut shutdown: Shutdown) {
        let idle = self.gate.config.idle();
        info!("Strategy gate loop started");

        // Shutdown is only checked between polls: an LPOP that already
        // removed an entry has to finish so the entry is evaluated.
        while !shutdown.is_triggered() {
            match source.poll().await {
                Ok(Some(signals)) => {
                    for signal in signals {
                        self.gate.evaluate(signal).await;
                    }
                }
                Ok(None) => {
                    if !shutdown.sleep(idle).await {
                        break;
                    }
                }
                Err(IngressError::Malformed(e)) => {
                    warn!("Dropping malformed ingress message: {:#}", e);
                }
                Err(e @ IngressError::Transport(_)) => {
                    warn!("{}", e);
                    if !shutdown.sleep(idle).await {
                        break;
                    }
                }
            }
        }

        info!("Strategy gate loop stopped");
    }
}
