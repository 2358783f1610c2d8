// Signal Router
// Deduplicates, prioritizes and fans confirmed signals out to execution destinations

pub mod config;
pub mod dedup;
pub mod destination;
pub mod expiry;
pub mod fanout;
pub mod pipeline;
pub mod scheduler;

pub use config::{HttpSinkConfig, QueueSinkConfig, RouterConfig};
pub use dedup::{DedupCache, DedupKey};
pub use destination::{AuditLogDestination, Destination, HttpDestination, RedisQueueDestination};
pub use expiry::{ExpiryValidator, ExpiryViolation, EXPIRED_REASON};
pub use fanout::{FanoutRouter, RouteReport};
pub use pipeline::{RouterLoop, Step};
pub use scheduler::PriorityScheduler;
