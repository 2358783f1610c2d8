//! Durable win/loss aggregates keyed by `"{symbol}:{strategy}"`
//!
//! Updates to one key serialize on its map shard; different keys proceed
//! independently. Every mutation is followed by a full snapshot flush. A
//! failed flush is logged and the in-memory table stays authoritative until
//! the next one succeeds.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use common::persist::{load_json_map_or_empty, write_json_atomic};
use common::{FeedbackRecord, Outcome, StrategyKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct FeedbackStore {
    records: DashMap<StrategyKey, FeedbackRecord>,
    path: Option<PathBuf>,
    inactivity: Duration,
    flush_lock: Mutex<()>,
}

impl FeedbackStore {
    pub fn in_memory(inactivity: Duration) -> Self {
        Self {
            records: DashMap::new(),
            path: None,
            inactivity,
            flush_lock: Mutex::new(()),
        }
    }

    /// Load the snapshot at `path`. A missing file is an empty store; an
    /// unreadable one is moved aside and the store starts empty. Entries with
    /// unparseable keys are skipped.
    pub fn load(path: PathBuf, inactivity: Duration) -> Self {
        let stored: BTreeMap<String, FeedbackRecord> = load_json_map_or_empty(&path);
        let store = Self::in_memory(inactivity);
        for (raw_key, record) in stored {
            match StrategyKey::parse(&raw_key) {
                Some(key) => {
                    store.records.insert(key, record);
                }
                None => warn!("Skipping feedback entry with malformed key {:?}", raw_key),
            }
        }
        info!("Loaded {} feedback records from {}", store.records.len(), path.display());
        Self {
            path: Some(path),
            ..store
        }
    }

    pub async fn record(&self, symbol: &str, strategy: &str, outcome: Outcome, reason: &str) -> FeedbackRecord {
        self.record_at(symbol, strategy, outcome, reason, Utc::now()).await
    }

    /// Apply one outcome and return the updated aggregate
    pub async fn record_at(
        &self,
        symbol: &str,
        strategy: &str,
        outcome: Outcome,
        reason: &str,
        now: DateTime<Utc>,
    ) -> FeedbackRecord {
        let key = StrategyKey::new(symbol, strategy);
        let updated = match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply(outcome, reason, now);
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(FeedbackRecord::first(outcome, reason, now)).clone(),
        };
        info!("Feedback tracked: {} - {} | {}", key, outcome, reason);
        self.flush_logged().await;
        updated
    }

    pub fn get(&self, key: &StrategyKey) -> Option<FeedbackRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Point-in-time copy of every record
    pub fn snapshot(&self) -> BTreeMap<StrategyKey, FeedbackRecord> {
        self.records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop records not updated within the inactivity horizon; returns the
    /// number removed. Flushes only when something was removed.
    pub async fn purge(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now - record.last_updated <= self.inactivity);
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            info!("Purged {} inactive feedback records", removed);
            self.flush_logged().await;
        }
        removed
    }

    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        let body: BTreeMap<String, FeedbackRecord> = self
            .records
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        write_json_atomic(path, &body).await
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            error!("Failed to persist feedback store: {:#}", e);
        }
    }
}
