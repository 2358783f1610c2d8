use crate::signal::Signal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status carried by a feedback event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackStatus {
    /// A destination (or the gate's forward step) could not deliver the signal
    Failed,
    /// A validation step turned the signal down
    Rejected,
}

/// Asynchronous report sent toward the learner whenever a signal fails or is
/// rejected somewhere in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub signal: Signal,
    pub status: FeedbackStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackEvent {
    pub fn failed(signal: Signal, reason: impl Into<String>) -> Self {
        Self {
            signal,
            status: FeedbackStatus::Failed,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn rejected(signal: Signal, reason: impl Into<String>) -> Self {
        Self {
            signal,
            status: FeedbackStatus::Rejected,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn key(&self) -> StrategyKey {
        StrategyKey::new(&self.signal.symbol, &self.signal.strategy)
    }
}

/// Settled trade result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
        }
    }
}

/// Message published on the trade-outcome stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub symbol: String,
    pub strategy: String,
    pub outcome: Outcome,
    #[serde(default)]
    pub reason: String,
}

/// (symbol, strategy) pair; rendered as `"{symbol}:{strategy}"` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrategyKey {
    pub symbol: String,
    pub strategy: String,
}

impl StrategyKey {
    pub fn new(symbol: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            strategy: strategy.into(),
        }
    }

    /// Split on the first `:`; symbols never contain one
    pub fn parse(raw: &str) -> Option<Self> {
        let (symbol, strategy) = raw.split_once(':')?;
        if symbol.is_empty() || strategy.is_empty() {
            return None;
        }
        Some(Self::new(symbol, strategy))
    }
}

impl fmt::Display for StrategyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.strategy)
    }
}

/// Win/loss aggregate for one (symbol, strategy)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub wins: u64,
    pub losses: u64,
    pub last_updated: DateTime<Utc>,
    pub last_outcome: Outcome,
    #[serde(default)]
    pub reason: String,
}

impl FeedbackRecord {
    pub fn first(outcome: Outcome, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut record = Self {
            wins: 0,
            losses: 0,
            last_updated: now,
            last_outcome: outcome,
            reason: String::new(),
        };
        record.apply(outcome, reason, now);
        record
    }

    pub fn apply(&mut self, outcome: Outcome, reason: impl Into<String>, now: DateTime<Utc>) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
        }
        self.last_updated = now;
        self.last_outcome = outcome;
        self.reason = reason.into();
    }

    pub fn total(&self) -> u64 {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.wins as f64 / total as f64),
        }
    }
}

/// Advisory consumers of learner verdicts; each gets its own channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvisoryChannel {
    Generator,
    Gate,
}

impl AdvisoryChannel {
    pub const ALL: [AdvisoryChannel; 2] = [AdvisoryChannel::Generator, AdvisoryChannel::Gate];

    pub fn default_topic(&self) -> &'static str {
        match self {
            AdvisoryChannel::Generator => "feedback:to:generator",
            AdvisoryChannel::Gate => "feedback:to:gate",
        }
    }
}

/// Promotion advisory pushed upstream by the learner
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamFeedback {
    pub symbol: String,
    pub strategy: String,
    pub feedback: FeedbackRecord,
}

impl UpstreamFeedback {
    pub fn key(&self) -> StrategyKey {
        StrategyKey::new(&self.symbol, &self.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_key_round_trip_through_display() {
        let key = StrategyKey::new("EURUSD", "momentum");
        assert_eq!(key.to_string(), "EURUSD:momentum");
        assert_eq!(StrategyKey::parse("EURUSD:momentum"), Some(key));
        assert_eq!(StrategyKey::parse("EURUSD"), None);
        assert_eq!(StrategyKey::parse(":momentum"), None);
    }

    #[test]
    fn test_record_counts_are_additive() {
        let now = Utc::now();
        let mut record = FeedbackRecord::first(Outcome::Win, "", now);
        assert_eq!((record.wins, record.losses), (1, 0));
        record.apply(Outcome::Loss, "stoploss hit", now);
        assert_eq!((record.wins, record.losses), (1, 1));
        assert_eq!(record.last_outcome, Outcome::Loss);
        assert_eq!(record.reason, "stoploss hit");
        assert_eq!(record.win_rate(), Some(0.5));
    }

    #[test]
    fn test_outcome_message_reason_is_optional() {
        let msg: OutcomeMessage =
            serde_json::from_str(r#"{"symbol":"EURUSD","strategy":"momentum","outcome":"win"}"#).unwrap();
        assert_eq!(msg.outcome, Outcome::Win);
        assert!(msg.reason.is_empty());
        assert!(serde_json::from_str::<OutcomeMessage>(
            r#"{"symbol":"EURUSD","strategy":"momentum","outcome":"draw"}"#
        )
        .is_err());
    }
}
