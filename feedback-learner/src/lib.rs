// Feedback Learner
// Aggregates trade outcomes and adapts strategy trust from them

pub mod advisory;
pub mod blacklist;
pub mod config;
pub mod inbox;
pub mod learner;
pub mod listener;
pub mod maintenance;
pub mod store;

pub use advisory::{AdvisoryPublisher, ChannelAdvisoryPublisher, CompositePublisher, RedisAdvisoryPublisher};
pub use blacklist::{InMemoryBlacklist, RedisBlacklist};
pub use config::{ChannelConfig, LearnerConfig};
pub use inbox::{FeedbackInbox, FeedbackTally};
pub use learner::{AdaptiveLearner, CycleReport, Verdict};
pub use listener::{ListenerError, OutcomeListener, OutcomeStream, RedisOutcomeStream};
pub use maintenance::Maintenance;
pub use store::FeedbackStore;
