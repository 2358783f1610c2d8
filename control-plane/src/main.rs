use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod event_bus;
mod ingress;

use common::{shutdown_channel, AdvisoryChannel, BlacklistTable, ChannelReporter, EnvelopeCodec, FeedbackReporter};
use config::{create_config_template, load_config, PlaneConfig};
use event_bus::RedisBus;
use feedback_learner::{
    AdaptiveLearner, ChannelAdvisoryPublisher, CompositePublisher, FeedbackInbox, FeedbackStore, InMemoryBlacklist,
    Maintenance, OutcomeListener, RedisAdvisoryPublisher, RedisBlacklist, RedisOutcomeStream,
};
use ingress::{pump, RedisQueueSource};
use signal_router::{
    AuditLogDestination, DedupCache, ExpiryValidator, FanoutRouter, HttpDestination, PriorityScheduler,
    RedisQueueDestination, RouterLoop,
};
use strategy_gate::{AdvisoryBoard, EconomicFilter, FailureMemory, GateLoop, HttpEconomicFilter, StaticFilter, StrategyGate};

const DEFAULT_CONFIG_PATH: &str = "signal-plane.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("--write-template") {
        let path = args.get(1).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);
        create_config_template(Path::new(path))?;
        info!("Wrote configuration template to {}", path);
        return Ok(());
    }

    let config_path = args.first().map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);
    let config = load_config(Path::new(config_path))?;

    info!("🚀 Starting signal control plane");
    run(config).await
}

async fn run(config: PlaneConfig) -> Result<()> {
    let (trigger, shutdown) = shutdown_channel();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    let bus = match &config.redis_url {
        Some(url) => Some(RedisBus::connect(url).await?),
        None => {
            warn!("No redis_url configured: ingress, outcome stream and queue destination are disabled");
            None
        }
    };
    let codec = EnvelopeCodec::from_key(config.envelope_key.as_deref()).context("Invalid envelope_key")?;
    if codec.is_encrypted() {
        info!("Payload envelopes are encrypted");
    }

    // Failure/rejection events from the router and the gate
    let (reporter, feedback_rx) = ChannelReporter::new();
    let reporter: Arc<dyn FeedbackReporter> = Arc::new(reporter);
    let inbox = Arc::new(FeedbackInbox::new());
    tasks.push(tokio::spawn(inbox.clone().run(feedback_rx, shutdown.clone())));

    // Learning side
    let store = Arc::new(match &config.learner.store_path {
        Some(path) => FeedbackStore::load(path.clone(), config.learner.inactivity()),
        None => FeedbackStore::in_memory(config.learner.inactivity()),
    });
    let local_blacklist = Arc::new(InMemoryBlacklist::new());
    let blacklist: Arc<dyn BlacklistTable> = match &bus {
        Some(bus) => Arc::new(RedisBlacklist::new(
            bus.connection(),
            config.learner.channels.blacklist_prefix.clone(),
        )),
        None => local_blacklist.clone(),
    };

    let advisories = Arc::new(AdvisoryBoard::new());
    let (gate_channel, gate_advisories) = ChannelAdvisoryPublisher::new(AdvisoryChannel::Gate);
    tasks.push(tokio::spawn(advisories.clone().run(gate_advisories, shutdown.clone())));

    let mut publisher = CompositePublisher::new().add_publisher(Arc::new(gate_channel));
    if let Some(bus) = &bus {
        publisher = publisher.add_publisher(Arc::new(RedisAdvisoryPublisher::new(
            bus.connection(),
            config.learner.channels.generator.clone(),
            config.learner.channels.gate.clone(),
        )));
    }

    let learner = AdaptiveLearner::new(&config.learner, store.clone(), blacklist.clone(), Arc::new(publisher));
    tasks.push(tokio::spawn(learner.run(shutdown.clone())));

    let mut maintenance = Maintenance::new(store.clone(), config.learner.maintenance_interval());
    if bus.is_none() {
        maintenance = maintenance.with_blacklist(local_blacklist);
    }
    tasks.push(tokio::spawn(maintenance.run(shutdown.clone())));

    // Routing side
    let scheduler = Arc::new(PriorityScheduler::new());
    let dedup = Arc::new(DedupCache::new(config.router.dedup_window()));
    let mut router = FanoutRouter::new(dedup.clone(), reporter.clone(), shutdown.clone());
    if let Some(http) = &config.router.http {
        router = router.add_destination(Arc::new(HttpDestination::new(
            http.url.clone(),
            codec.clone(),
            http.retry.clone(),
        )));
    }
    if let Some(queue) = &config.router.queue {
        match &bus {
            Some(bus) => {
                router = router.add_destination(Arc::new(RedisQueueDestination::new(
                    bus.connection(),
                    queue.key.clone(),
                    codec.clone(),
                    queue.retry.clone(),
                )));
            }
            None => warn!("Queue destination {} needs redis_url; skipping it", queue.key),
        }
    }
    if let Some(path) = &config.router.audit_log {
        router = router.add_destination(Arc::new(AuditLogDestination::new(path.clone())));
    }
    if router.destination_count() == 0 {
        warn!("No fan-out destinations configured; confirmed signals will only be deduplicated");
    }

    let router_loop = RouterLoop::new(
        scheduler.clone(),
        ExpiryValidator::new(config.router.max_age()),
        dedup,
        router,
        reporter.clone(),
    )
    .with_idle(config.router.idle())
    .with_sweep_interval(config.router.sweep_interval());
    tasks.push(tokio::spawn(router_loop.run(shutdown.clone())));

    // Redis-fed inputs
    let mut gate: Option<Arc<StrategyGate>> = None;
    if let Some(bus) = &bus {
        let stream = Arc::new(RedisOutcomeStream::new(
            bus.client(),
            config.learner.channels.outcomes.clone(),
        ));
        let listener = OutcomeListener::new(store.clone(), stream, config.learner.reconnect_delay());
        tasks.push(tokio::spawn(listener.run(shutdown.clone())));

        let source = RedisQueueSource::new(bus.connection(), config.ingress.queue_key.clone(), codec.clone());
        if config.gate.enabled {
            let memory = Arc::new(FailureMemory::load(config.gate.failure_memory_path.clone()));
            let filter: Arc<dyn EconomicFilter> = match &config.gate.economic_filter.url {
                Some(url) => Arc::new(HttpEconomicFilter::new(
                    url.clone(),
                    config.gate.economic_filter.retry.clone(),
                    shutdown.clone(),
                )),
                None => {
                    info!("No economic filter configured; every signal passes it unadjusted");
                    Arc::new(StaticFilter::pass_through())
                }
            };
            let strategy_gate = Arc::new(
                StrategyGate::new(config.gate.clone(), memory, filter, scheduler.clone(), reporter.clone())
                    .with_blacklist(blacklist.clone())
                    .with_advisories(advisories.clone()),
            );
            gate = Some(strategy_gate.clone());
            tasks.push(tokio::spawn(GateLoop::new(strategy_gate).run(source, shutdown.clone())));
        } else {
            tasks.push(tokio::spawn(pump(source, scheduler.clone(), config.gate.idle(), shutdown.clone())));
        }
    }

    info!("Control plane running with {} tasks", tasks.len());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("👋 Shutting down gracefully...");
    trigger.trigger();
    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }

    if let Err(e) = store.flush().await {
        error!("Failed to persist feedback store: {:#}", e);
    }
    if let Some(gate) = gate {
        if let Err(e) = gate.memory().flush().await {
            error!("Failed to persist failure memory: {:#}", e);
        }
    }
    info!("Stopped with {} pending signals", scheduler.len());
    Ok(())
}
