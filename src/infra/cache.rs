use anyhow::Result;
use redis::{AsyncCommands, Client};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

/// Opportunistic JSON cache. Reads and writes never fail the caller.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok(())
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.client.get_multiplexed_async_connection().await.ok()?;
        let payload = conn.get::<_, Option<String>>(key).await.ok()??;
        serde_json::from_str(&payload).ok()
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        let Ok(payload) = serde_json::to_string(value) else {
            return;
        };
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                if let Err(err) = conn.set_ex::<_, _, ()>(key, payload, ttl_seconds).await {
                    warn!(error = ?err, key, "failed to write cache entry");
                }
            }
            Err(err) => warn!(error = ?err, "cache unavailable"),
        }
    }
}
