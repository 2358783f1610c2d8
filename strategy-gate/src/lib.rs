//! Strategy Gate
//!
//! Screens candidate signals per strategy before they reach the scheduler:
//! short-circuits strategies that keep failing or that the learner has
//! blacklisted, applies the external economic-context adjustment and enforces
//! the confidence threshold.

mod advisory;
mod config;
mod economic;
mod failure_memory;
mod gate;

pub use advisory::AdvisoryBoard;
pub use config::{EconomicFilterConfig, GateConfig};
pub use economic::{EconomicFilter, EconomicVerdict, HttpEconomicFilter, StaticFilter};
pub use failure_memory::FailureMemory;
pub use gate::{GateDecision, GateLoop, RejectReason, StrategyGate};
