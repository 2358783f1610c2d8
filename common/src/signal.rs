use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Strategy name used when a producer does not tag its signal
pub const UNKNOWN_STRATEGY: &str = "unknown";

/// Trade direction of a signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
        }
    }
}

/// Directional recommendation produced upstream
///
/// Immutable once admitted, except for `confidence`, which the strategy gate
/// adjusts exactly once through [`Signal::with_adjusted_confidence`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub confidence: f64, // 0.0 to 1.0
    pub reason: String,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(alias = "timestamp", deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "expires", deserialize_with = "timestamp::deserialize")]
    pub expires_at: DateTime<Utc>,
}

fn default_strategy() -> String {
    UNKNOWN_STRATEGY.to_string()
}

/// Violations of the signal model invariants
#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("signal symbol is empty")]
    EmptySymbol,
    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
    #[error("expires_at {expires_at} is not after created_at {created_at}")]
    InvalidWindow {
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
}

impl Signal {
    pub fn new(
        symbol: impl Into<String>,
        direction: Direction,
        confidence: f64,
        reason: impl Into<String>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Self, SignalError> {
        let signal = Self {
            symbol: symbol.into(),
            direction,
            confidence,
            reason: reason.into(),
            strategy: default_strategy(),
            created_at,
            expires_at,
        };
        signal.validate()?;
        Ok(signal)
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Check the model invariants; used on every ingress path
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.symbol.trim().is_empty() {
            return Err(SignalError::EmptySymbol);
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SignalError::ConfidenceOutOfRange(self.confidence));
        }
        if self.expires_at <= self.created_at {
            return Err(SignalError::InvalidWindow {
                created_at: self.created_at,
                expires_at: self.expires_at,
            });
        }
        Ok(())
    }

    /// Apply an additive confidence adjustment, clamped to [0, 1] and rounded
    /// to `precision` decimal places.
    pub fn with_adjusted_confidence(mut self, adjustment: f64, precision: u32) -> Self {
        let raw = self.confidence + adjustment;
        let clamped = if raw.is_finite() { raw.clamp(0.0, 1.0) } else { 0.0 };
        let scale = 10f64.powi(precision as i32);
        self.confidence = (clamped * scale).round() / scale;
        self
    }
}

/// Timestamps arrive either as RFC 3339 or as naive ISO-8601 (implicitly UTC)
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{de, Deserialize, Deserializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        raw.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}
