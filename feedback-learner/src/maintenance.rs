// Maintenance loop
// Purges inactive feedback records and sweeps lapsed in-memory blacklist entries

use crate::blacklist::InMemoryBlacklist;
use crate::store::FeedbackStore;
use chrono::{DateTime, Utc};
use common::Shutdown;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct Maintenance {
    store: Arc<FeedbackStore>,
    blacklist: Option<Arc<InMemoryBlacklist>>,
    interval: Duration,
}

impl Maintenance {
    pub fn new(store: Arc<FeedbackStore>, interval: Duration) -> Self {
        Self {
            store,
            blacklist: None,
            interval,
        }
    }

    /// Redis-backed blacklists expire on their own and need no sweep
    pub fn with_blacklist(mut self, blacklist: Arc<InMemoryBlacklist>) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    /// Returns (records purged, blacklist entries swept)
    pub async fn run_once(&self, now: DateTime<Utc>) -> (usize, usize) {
        let purged = self.store.purge(now).await;
        let swept = self.blacklist.as_ref().map_or(0, |b| b.sweep(now));
        if swept > 0 {
            debug!("Swept {} lapsed blacklist entries", swept);
        }
        (purged, swept)
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        while shutdown.sleep(self.interval).await {
            self.run_once(Utc::now()).await;
        }
        info!("Maintenance loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use common::{BlacklistTable, Outcome, StrategyKey};

    #[tokio::test]
    async fn test_purges_store_and_sweeps_blacklist() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let store = Arc::new(FeedbackStore::in_memory(ChronoDuration::days(10)));
        store.record_at("EURUSD", "momentum", Outcome::Loss, "", t0).await;
        let blacklist = Arc::new(InMemoryBlacklist::new());
        blacklist
            .insert(&StrategyKey::new("EURUSD", "momentum"), t0, ChronoDuration::days(5))
            .await
            .unwrap();

        let maintenance = Maintenance::new(store.clone(), Duration::from_secs(60)).with_blacklist(blacklist.clone());
        assert_eq!(maintenance.run_once(t0 + ChronoDuration::days(6)).await, (0, 1));
        assert_eq!(maintenance.run_once(t0 + ChronoDuration::days(11)).await, (1, 0));
        assert!(store.is_empty());
        assert!(blacklist.is_empty());
    }
}
