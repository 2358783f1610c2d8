//! Per-strategy count of consecutive rejections
//!
//! Keys are strategy names. A strategy with no entry has zero failures; a
//! success removes the entry rather than decrementing it. When a path is
//! configured the table is loaded at startup and flushed after each change.

use anyhow::Result;
use common::persist::{load_json_map_or_empty, write_json_atomic};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, info};

pub struct FailureMemory {
    counts: DashMap<String, u32>,
    path: Option<PathBuf>,
    flush_lock: Mutex<()>,
}

impl FailureMemory {
    pub fn in_memory() -> Self {
        Self {
            counts: DashMap::new(),
            path: None,
            flush_lock: Mutex::new(()),
        }
    }

    /// An unreadable snapshot is moved aside and the memory starts empty
    pub fn load(path: Option<PathBuf>) -> Self {
        let memory = Self::in_memory();
        if let Some(path) = &path {
            let stored: BTreeMap<String, u32> = load_json_map_or_empty(path);
            info!("Loaded failure memory for {} strategies from {}", stored.len(), path.display());
            for (strategy, failures) in stored {
                memory.counts.insert(strategy, failures);
            }
        }
        Self { path, ..memory }
    }

    pub fn failures(&self, strategy: &str) -> u32 {
        self.counts.get(strategy).map(|c| *c).unwrap_or(0)
    }

    /// Increment and return the new count
    pub async fn record_failure(&self, strategy: &str) -> u32 {
        let count = {
            let mut entry = self.counts.entry(strategy.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        self.flush_logged().await;
        count
    }

    /// Forget a strategy's failures; returns whether it had any
    pub async fn clear(&self, strategy: &str) -> bool {
        let removed = self.counts.remove(strategy).is_some();
        if removed {
            self.flush_logged().await;
        }
        removed
    }

    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        write_json_atomic(path, &self.snapshot()).await
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            error!("Failed to persist failure memory: {:#}", e);
        }
    }
}
