//! Content-addressed, time-bounded memory of recently routed signals

use chrono::{DateTime, Duration, Utc};
use common::Signal;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// SHA3-256 over the identifying fields of a signal, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn of(signal: &Signal) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(signal.symbol.as_bytes());
        hasher.update(b"|");
        hasher.update(signal.direction.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(signal.confidence.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(signal.reason.as_bytes());
        hasher.update(b"|");
        hasher.update(signal.created_at.to_rfc3339().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short prefix is enough to correlate log lines
        write!(f, "{}", &self.0[..12.min(self.0.len())])
    }
}

/// Map of digest to last-seen time. An entry counts as fresh only while
/// `now - last_seen <= window`; presence alone means nothing.
pub struct DedupCache {
    entries: DashMap<DedupKey, DateTime<Utc>>,
    window: Duration,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether `key` was marked within the window. Stale entries found here
    /// are dropped without waiting for the next sweep.
    pub fn seen(&self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        let fresh = self
            .entries
            .get(key)
            .map(|last_seen| now - *last_seen <= self.window);
        match fresh {
            Some(true) => true,
            Some(false) => {
                self.entries
                    .remove_if(key, |_, last_seen| now - *last_seen > self.window);
                false
            }
            None => false,
        }
    }

    pub fn mark(&self, key: DedupKey, now: DateTime<Utc>) {
        self.entries.insert(key, now);
    }

    /// Returns `true` if `key` is a duplicate; otherwise records it as seen
    /// at `now`. The check and the write happen under the same shard lock.
    pub fn check_and_mark(&self, key: &DedupKey, now: DateTime<Utc>) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if now - *entry.get() <= self.window {
                    true
                } else {
                    entry.insert(now);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Remove every entry older than the window; returns how many went
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, last_seen| now - *last_seen <= self.window);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new(Duration::seconds(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use common::Direction;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn signal(confidence: f64) -> Signal {
        Signal::new("EURUSD", Direction::Buy, confidence, "RSI breakout", t0(), t0() + Duration::minutes(3))
            .unwrap()
    }

    #[test]
    fn test_key_covers_identifying_fields_only() {
        let a = DedupKey::of(&signal(0.91));
        assert_eq!(a, DedupKey::of(&signal(0.91)));
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, DedupKey::of(&signal(0.92)));
        // Strategy is not part of the identity
        assert_eq!(a, DedupKey::of(&signal(0.91).with_strategy("momentum")));
    }

    #[test]
    fn test_seen_within_window_only() {
        let cache = DedupCache::default();
        let key = DedupKey::of(&signal(0.91));
        assert!(!cache.seen(&key, t0()));
        cache.mark(key.clone(), t0());
        assert!(cache.seen(&key, t0() + Duration::seconds(300)));
        // Past the window the entry is stale and lazily removed
        assert!(!cache.seen(&key, t0() + Duration::seconds(301)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_check_and_mark_treats_stale_entry_as_new() {
        let cache = DedupCache::default();
        let key = DedupKey::of(&signal(0.91));
        assert!(!cache.check_and_mark(&key, t0()));
        assert!(cache.check_and_mark(&key, t0() + Duration::seconds(10)));
        // A duplicate hit does not extend the window
        assert!(!cache.check_and_mark(&key, t0() + Duration::seconds(301)));
        assert!(cache.check_and_mark(&key, t0() + Duration::seconds(400)));
    }

    #[test]
    fn test_sweep_removes_only_expired_entries() {
        let cache = DedupCache::default();
        cache.mark(DedupKey::of(&signal(0.5)), t0());
        cache.mark(DedupKey::of(&signal(0.6)), t0() + Duration::seconds(200));
        assert_eq!(cache.sweep(t0() + Duration::seconds(400)), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.sweep(t0() + Duration::seconds(400)), 0);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_pass_once() {
        let cache = std::sync::Arc::new(DedupCache::default());
        let key = DedupKey::of(&signal(0.91));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move { cache.check_and_mark(&key, t0()) })
            })
            .collect();
        let mut fresh = 0;
        for handle in handles {
            if !handle.await.unwrap() {
                fresh += 1;
            }
        }
        assert_eq!(fresh, 1);
    }
}
