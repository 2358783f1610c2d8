use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use tracing::info;

/// Shared Redis handles: a multiplexed command connection plus the client
/// used to open dedicated pub/sub connections
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid redis_url")?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .context("Failed to connect to Redis")?;

        info!("Connected to Redis");
        Ok(Self { client, conn })
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub fn client(&self) -> redis::Client {
        self.client.clone()
    }
}
