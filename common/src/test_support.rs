//! In-process collaborators for tests across the workspace

use crate::feedback::FeedbackEvent;
use crate::ports::{FeedbackReporter, IngressError, SignalSink, SignalSource};
use crate::signal::{Direction, Signal};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn sample_signal(symbol: &str, strategy: &str, confidence: f64, created_at: DateTime<Utc>) -> Signal {
    Signal::new(
        symbol,
        Direction::Buy,
        confidence,
        "RSI breakout",
        created_at,
        created_at + Duration::minutes(3),
    )
    .expect("sample signal is valid")
    .with_strategy(strategy)
}

#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<FeedbackEvent>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<FeedbackEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl FeedbackReporter for RecordingReporter {
    fn report(&self, event: FeedbackEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl RecordingSink {
    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn submit(&self, signal: Signal) -> anyhow::Result<()> {
        self.signals.lock().unwrap().push(signal);
        Ok(())
    }
}

/// Scripted signal source; each entry is one poll result
#[derive(Debug, Default)]
pub struct ScriptedSource {
    polls: VecDeque<Result<Option<Vec<Signal>>, String>>,
    latency: std::time::Duration,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_signals(mut self, signals: Vec<Signal>) -> Self {
        self.polls.push_back(Ok(Some(signals)));
        self
    }

    pub fn push_malformed(mut self, why: &str) -> Self {
        self.polls.push_back(Err(why.to_string()));
        self
    }

    /// Every poll takes this long before answering, like a slow LPOP
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl SignalSource for ScriptedSource {
    async fn poll(&mut self) -> Result<Option<Vec<Signal>>, IngressError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.polls.pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(why)) => Err(IngressError::Malformed(anyhow::anyhow!(why))),
            None => Ok(None),
        }
    }
}
