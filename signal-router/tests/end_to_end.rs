use chrono::{Duration, Utc};
use common::test_support::RecordingReporter;
use common::{Direction, EnvelopeCodec, FeedbackReporter, RetryPolicy, Shutdown, Signal, SignalSink};
use signal_router::{
    AuditLogDestination, DedupCache, ExpiryValidator, FanoutRouter, HttpDestination, PriorityScheduler,
    RouteReport, RouterLoop, Step,
};
use std::sync::Arc;
use tracing_test::traced_test;

fn eurusd() -> Signal {
    let t = Utc::now();
    Signal::new("EURUSD", Direction::Buy, 0.91, "RSI breakout", t, t + Duration::minutes(3))
        .unwrap()
        .with_strategy("momentum")
}

#[tokio::test]
#[traced_test]
async fn test_same_signal_twice_is_routed_once() {
    let mut server = mockito::Server::new_async().await;
    let execute = server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let reporter = RecordingReporter::default();
    let feedback: Arc<dyn FeedbackReporter> = Arc::new(reporter.clone());
    let scheduler = Arc::new(PriorityScheduler::new());
    let dedup = Arc::new(DedupCache::default());
    let router = FanoutRouter::new(dedup.clone(), feedback.clone(), Shutdown::never())
        .add_destination(Arc::new(HttpDestination::new(
            format!("{}/execute", server.url()),
            EnvelopeCodec::Plain,
            RetryPolicy::http_forward(),
        )))
        .add_destination(Arc::new(AuditLogDestination::new(&audit_path)));
    let router_loop = RouterLoop::new(scheduler.clone(), ExpiryValidator::default(), dedup, router, feedback);

    let signal = eurusd();
    scheduler.submit(signal.clone()).await.unwrap();
    scheduler.submit(signal).await.unwrap();

    let now = Utc::now();
    let first = router_loop.process_one(now).await;
    let second = router_loop.process_one(now).await;

    assert_eq!(
        first,
        Step::Routed(RouteReport::Dispatched {
            delivered: vec!["http".to_string(), "audit_log".to_string()],
            failed: vec![],
        })
    );
    assert_eq!(second, Step::Routed(RouteReport::Duplicate));
    assert_eq!(router_loop.process_one(now).await, Step::Idle);

    execute.assert_async().await;
    assert_eq!(std::fs::read_to_string(&audit_path).unwrap().lines().count(), 1);
    assert!(reporter.events().is_empty());

    logs_assert(|lines: &[&str]| {
        match lines.iter().filter(|line| line.contains("Duplicate signal skipped: EURUSD")).count() {
            1 => Ok(()),
            n => Err(format!("expected one duplicate log event, saw {}", n)),
        }
    });
}

#[tokio::test]
async fn test_sink_failure_is_reported_and_other_destinations_still_written() {
    let mut server = mockito::Server::new_async().await;
    let execute = server
        .mock("POST", "/execute")
        .with_status(502)
        .expect(3)
        .create_async()
        .await;
    let dir = tempfile::tempdir().unwrap();
    let audit_path = dir.path().join("audit.jsonl");

    let reporter = RecordingReporter::default();
    let feedback: Arc<dyn FeedbackReporter> = Arc::new(reporter.clone());
    let policy = RetryPolicy::new(3, std::time::Duration::from_millis(5), std::time::Duration::from_secs(2));
    let router = FanoutRouter::new(Arc::new(DedupCache::default()), feedback, Shutdown::never())
        .add_destination(Arc::new(HttpDestination::new(
            format!("{}/execute", server.url()),
            EnvelopeCodec::Plain,
            policy,
        )))
        .add_destination(Arc::new(AuditLogDestination::new(&audit_path)));

    let report = router.route(&eurusd()).await;
    assert_eq!(
        report,
        RouteReport::Dispatched {
            delivered: vec!["audit_log".to_string()],
            failed: vec!["http".to_string()],
        }
    );
    execute.assert_async().await;
    assert!(audit_path.exists());

    let events = reporter.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].signal.symbol, "EURUSD");
    assert!(events[0].reason.contains("502"));
}
