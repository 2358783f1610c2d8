//! Shared model for the signal control plane
//!
//! Holds the types that cross component boundaries (signals, feedback and
//! outcome messages), the ports each component talks through, and the small
//! runtime pieces every loop needs (retry policy, shutdown signal, payload
//! envelope, JSON snapshot persistence).

pub mod envelope;
pub mod feedback;
pub mod persist;
pub mod ports;
pub mod retry;
pub mod shutdown;
pub mod signal;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use envelope::{Envelope, EnvelopeCodec};
pub use feedback::{
    AdvisoryChannel, FeedbackEvent, FeedbackRecord, FeedbackStatus, Outcome, OutcomeMessage,
    StrategyKey, UpstreamFeedback,
};
pub use ports::{BlacklistTable, ChannelReporter, FeedbackReporter, IngressError, SignalSink, SignalSource};
pub use retry::{call_with_retry, RetryError, RetryPolicy};
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use signal::{Direction, Signal, SignalError};
