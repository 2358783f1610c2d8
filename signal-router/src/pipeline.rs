// Router consumption loop
// Scheduler -> expiry revalidation -> dedup -> fan-out

use super::dedup::DedupCache;
use super::expiry::{ExpiryValidator, EXPIRED_REASON};
use super::fanout::{FanoutRouter, RouteReport};
use super::scheduler::PriorityScheduler;
use chrono::{DateTime, Utc};
use common::{FeedbackEvent, FeedbackReporter, Shutdown};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Result of one pass over the queue
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The queue was empty
    Idle,
    /// The popped signal aged out while queued
    Expired,
    Routed(RouteReport),
}

pub struct RouterLoop {
    scheduler: Arc<PriorityScheduler>,
    expiry: ExpiryValidator,
    dedup: Arc<DedupCache>,
    router: FanoutRouter,
    reporter: Arc<dyn FeedbackReporter>,
    idle: Duration,
    sweep_interval: Duration,
}

impl RouterLoop {
    pub fn new(
        scheduler: Arc<PriorityScheduler>,
        expiry: ExpiryValidator,
        dedup: Arc<DedupCache>,
        router: FanoutRouter,
        reporter: Arc<dyn FeedbackReporter>,
    ) -> Self {
        Self {
            scheduler,
            expiry,
            dedup,
            router,
            reporter,
            idle: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
        }
    }

    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Pop at most one signal and carry it through the pipeline
    pub async fn process_one(&self, now: DateTime<Utc>) -> Step {
        let Some(signal) = self.scheduler.dequeue() else {
            return Step::Idle;
        };

        if !self.expiry.valid(&signal, now) {
            info!(
                "Dropping expired signal {} {} ({})",
                signal.symbol, signal.direction, signal.strategy
            );
            self.reporter
                .report(FeedbackEvent::rejected(signal, EXPIRED_REASON));
            return Step::Expired;
        }

        Step::Routed(self.router.route_at(&signal, now).await)
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        info!(
            "Router loop started with {} destination(s)",
            self.router.destination_count()
        );
        let mut last_sweep = Instant::now();

        while !shutdown.is_triggered() {
            if last_sweep.elapsed() >= self.sweep_interval {
                let removed = self.dedup.sweep(Utc::now());
                if removed > 0 {
                    debug!("Swept {} stale dedup entries", removed);
                }
                last_sweep = Instant::now();
            }

            if self.process_one(Utc::now()).await == Step::Idle
                && !shutdown.sleep(self.idle).await
            {
                break;
            }
        }

        info!("Router loop stopped ({} signal(s) left queued)", self.scheduler.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use common::shutdown_channel;
    use common::test_support::{sample_signal, RecordingReporter};
    use common::FeedbackStatus;

    fn build(reporter: &RecordingReporter) -> (Arc<PriorityScheduler>, RouterLoop) {
        let scheduler = Arc::new(PriorityScheduler::new());
        let dedup = Arc::new(DedupCache::default());
        let reporter: Arc<dyn FeedbackReporter> = Arc::new(reporter.clone());
        let router = FanoutRouter::new(dedup.clone(), reporter.clone(), Shutdown::never());
        let router_loop = RouterLoop::new(
            scheduler.clone(),
            ExpiryValidator::default(),
            dedup,
            router,
            reporter,
        );
        (scheduler, router_loop)
    }

    #[tokio::test]
    async fn test_expired_while_queued_is_reported() {
        let reporter = RecordingReporter::default();
        let (scheduler, router_loop) = build(&reporter);
        let created = Utc::now() - ChronoDuration::minutes(4);
        scheduler.enqueue(sample_signal("EURUSD", "momentum", 0.99, created));

        assert_eq!(router_loop.process_one(Utc::now()).await, Step::Expired);
        assert_eq!(router_loop.process_one(Utc::now()).await, Step::Idle);

        let events = reporter.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, FeedbackStatus::Rejected);
        assert_eq!(events[0].reason, "expired");
    }

    #[tokio::test]
    async fn test_highest_confidence_routed_first() {
        let reporter = RecordingReporter::default();
        let (scheduler, router_loop) = build(&reporter);
        let now = Utc::now();
        scheduler.enqueue(sample_signal("GBPUSD", "momentum", 0.80, now));
        scheduler.enqueue(sample_signal("EURUSD", "momentum", 0.91, now));

        assert!(matches!(router_loop.process_one(now).await, Step::Routed(_)));
        assert_eq!(scheduler.dequeue().map(|s| s.symbol), Some("GBPUSD".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_promptly_on_shutdown() {
        let reporter = RecordingReporter::default();
        let (_scheduler, router_loop) = build(&reporter);
        let (trigger, shutdown) = shutdown_channel();
        let handle = tokio::spawn(router_loop.with_idle(Duration::from_secs(30)).run(shutdown));
        tokio::task::yield_now().await;
        trigger.trigger();
        handle.await.unwrap();
    }
}
