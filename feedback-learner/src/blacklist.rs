//! Time-bounded (symbol, strategy) blacklists
//!
//! Entries lapse on their own; nothing clears them early.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{BlacklistTable, StrategyKey};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Process-local table used when no Redis is configured
#[derive(Debug, Default)]
pub struct InMemoryBlacklist {
    expiries: DashMap<StrategyKey, DateTime<Utc>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_at(&self, key: &StrategyKey) -> Option<DateTime<Utc>> {
        self.expiries.get(key).map(|e| *e.value())
    }

    /// Drop lapsed entries; returns how many went
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.expiries.len();
        self.expiries.retain(|_, expires_at| *expires_at > now);
        before.saturating_sub(self.expiries.len())
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}

#[async_trait]
impl BlacklistTable for InMemoryBlacklist {
    async fn insert(&self, key: &StrategyKey, now: DateTime<Utc>, ttl: Duration) -> Result<()> {
        self.expiries.insert(key.clone(), now + ttl);
        Ok(())
    }

    async fn contains(&self, key: &StrategyKey, now: DateTime<Utc>) -> Result<bool> {
        let live = self.expiries.get(key).map(|e| *e.value() > now);
        if live == Some(false) {
            self.expiries.remove_if(key, |_, expires_at| *expires_at <= now);
        }
        Ok(live.unwrap_or(false))
    }
}

/// Shared table: `SET {prefix}:{symbol}:{strategy} 1 EX ttl`, queried with `EXISTS`
pub struct RedisBlacklist {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBlacklist {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &StrategyKey) -> String {
        format!("{}:{}:{}", self.prefix, key.symbol, key.strategy)
    }
}

#[async_trait]
impl BlacklistTable for RedisBlacklist {
    async fn insert(&self, key: &StrategyKey, _now: DateTime<Utc>, ttl: Duration) -> Result<()> {
        let redis_key = self.redis_key(key);
        let seconds = ttl.num_seconds().max(1) as u64;
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&redis_key, "1", seconds)
            .await
            .with_context(|| format!("SET {} failed", redis_key))?;
        Ok(())
    }

    async fn contains(&self, key: &StrategyKey, _now: DateTime<Utc>) -> Result<bool> {
        let redis_key = self.redis_key(key);
        let mut conn = self.conn.clone();
        conn.exists::<_, bool>(&redis_key)
            .await
            .with_context(|| format!("EXISTS {} failed", redis_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_entry_lapses_after_ttl() {
        let blacklist = InMemoryBlacklist::new();
        let key = StrategyKey::new("EURUSD", "momentum");
        blacklist.insert(&key, t0(), Duration::days(5)).await.unwrap();

        assert!(blacklist.contains(&key, t0() + Duration::days(4)).await.unwrap());
        assert!(!blacklist.contains(&key, t0() + Duration::days(5)).await.unwrap());
        assert!(blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_extends_expiry() {
        let blacklist = InMemoryBlacklist::new();
        let key = StrategyKey::new("EURUSD", "momentum");
        blacklist.insert(&key, t0(), Duration::days(5)).await.unwrap();
        blacklist
            .insert(&key, t0() + Duration::days(3), Duration::days(5))
            .await
            .unwrap();
        assert_eq!(blacklist.expires_at(&key), Some(t0() + Duration::days(8)));
    }

    #[tokio::test]
    async fn test_sweep_drops_lapsed_entries() {
        let blacklist = InMemoryBlacklist::new();
        blacklist
            .insert(&StrategyKey::new("EURUSD", "momentum"), t0(), Duration::days(1))
            .await
            .unwrap();
        blacklist
            .insert(&StrategyKey::new("GBPUSD", "momentum"), t0(), Duration::days(5))
            .await
            .unwrap();
        assert_eq!(blacklist.sweep(t0() + Duration::days(2)), 1);
        assert_eq!(blacklist.len(), 1);
    }
}
