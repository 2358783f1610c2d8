// Fan-out Router
// Delivers one signal to every configured destination, isolating failures

use super::dedup::{DedupCache, DedupKey};
use super::destination::Destination;
use chrono::{DateTime, Utc};
use common::{FeedbackEvent, FeedbackReporter, Shutdown, Signal};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What happened to one routed signal
#[derive(Debug, Clone, PartialEq)]
pub enum RouteReport {
    /// Seen within the dedup window; nothing was contacted
    Duplicate,
    Dispatched {
        delivered: Vec<String>,
        failed: Vec<String>,
    },
}

impl RouteReport {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RouteReport::Duplicate)
    }
}

pub struct FanoutRouter {
    destinations: Vec<Arc<dyn Destination>>,
    dedup: Arc<DedupCache>,
    reporter: Arc<dyn FeedbackReporter>,
    shutdown: Shutdown,
}

impl FanoutRouter {
    pub fn new(dedup: Arc<DedupCache>, reporter: Arc<dyn FeedbackReporter>, shutdown: Shutdown) -> Self {
        Self {
            destinations: Vec::new(),
            dedup,
            reporter,
            shutdown,
        }
    }

    /// Add a destination; the list is fixed once the router starts routing
    pub fn add_destination(mut self, destination: Arc<dyn Destination>) -> Self {
        info!("Adding fan-out destination: {}", destination.name());
        self.destinations.push(destination);
        self
    }

    pub fn destination_count(&self) -> usize {
        self.destinations.len()
    }

    pub async fn route(&self, signal: &Signal) -> RouteReport {
        self.route_at(signal, Utc::now()).await
    }

    /// Dedup check, then every destination attempted concurrently. A failure
    /// on one destination neither blocks nor undoes the others.
    pub async fn route_at(&self, signal: &Signal, now: DateTime<Utc>) -> RouteReport {
        let key = DedupKey::of(signal);
        if self.dedup.check_and_mark(&key, now) {
            warn!(
                "Duplicate signal skipped: {} {} {:.4} ({})",
                signal.symbol, signal.direction, signal.confidence, key
            );
            return RouteReport::Duplicate;
        }

        let attempts = self.destinations.iter().map(|destination| async move {
            let outcome = destination.deliver(signal, &self.shutdown).await;
            (destination.name().to_string(), outcome)
        });

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, outcome) in join_all(attempts).await {
            match outcome {
                Ok(()) => {
                    debug!("Delivered {} to {}", signal.symbol, name);
                    delivered.push(name);
                }
                Err(e) => {
                    error!(
                        "Destination {} failed for {} ({}): {:#}",
                        name, signal.symbol, signal.strategy, e
                    );
                    self.reporter
                        .report(FeedbackEvent::failed(signal.clone(), format!("{name}: {e:#}")));
                    failed.push(name);
                }
            }
        }

        RouteReport::Dispatched { delivered, failed }
    }
}
