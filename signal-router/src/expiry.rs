// Expiry Validator
// Rejects signals that waited too long or are past their declared deadline

use chrono::{DateTime, Duration, Utc};
use common::Signal;
use std::fmt;
use tracing::debug;

/// Feedback reason for every expiry rejection
pub const EXPIRED_REASON: &str = "expired";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExpiryViolation {
    /// `now - created_at` exceeded the maximum age
    TooOld { age: Duration, max_age: Duration },
    /// `now` is after the signal's own `expires_at`
    PastDeadline { overdue: Duration },
}

impl fmt::Display for ExpiryViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryViolation::TooOld { age, max_age } => write!(
                f,
                "signal is {}s old (max {}s)",
                age.num_seconds(),
                max_age.num_seconds()
            ),
            ExpiryViolation::PastDeadline { overdue } => {
                write!(f, "signal expired {}s ago", overdue.num_seconds())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExpiryValidator {
    max_age: Duration,
}

impl ExpiryValidator {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }

    pub fn check(&self, signal: &Signal, now: DateTime<Utc>) -> Result<(), ExpiryViolation> {
        let age = now - signal.created_at;
        if age > self.max_age {
            return Err(ExpiryViolation::TooOld {
                age,
                max_age: self.max_age,
            });
        }
        if now > signal.expires_at {
            return Err(ExpiryViolation::PastDeadline {
                overdue: now - signal.expires_at,
            });
        }
        Ok(())
    }

    pub fn valid(&self, signal: &Signal, now: DateTime<Utc>) -> bool {
        match self.check(signal, now) {
            Ok(()) => true,
            Err(violation) => {
                debug!("Expiry check failed for {}: {}", signal.symbol, violation);
                false
            }
        }
    }
}

impl Default for ExpiryValidator {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}
