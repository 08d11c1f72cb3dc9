use super::CacheStore;
use anyhow::Context;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::time::timeout;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let connection = timeout(COMMAND_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .context("redis connect timed out")?
            .context("failed to connect to redis")?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut connection = self.connection.clone();
        let value: Option<String> = timeout(COMMAND_TIMEOUT, connection.get(key))
            .await
            .context("redis GET timed out")??;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        let mut connection = self.connection.clone();
        let seconds = ttl.as_secs().max(1) as usize;
        let _: () = timeout(COMMAND_TIMEOUT, connection.set_ex(key, value, seconds))
            .await
            .context("redis SET timed out")??;
        Ok(())
    }
}
