//! Redis pub/sub transport
//!
//! Publishing goes through a `deadpool-redis` pool; each subscription holds
//! its own dedicated pub/sub connection. Retries and reconnects are left to
//! the caller.

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use futures::StreamExt;

use super::{DocumentUpdate, FanoutBridge, FanoutError, FanoutStream};
use crate::config::RedisConfig;

pub struct RedisFanout {
    /// Client used to open pub/sub connections
    client: redis::Client,
    /// Publisher connection pool
    pool: Pool,
    /// Topic name
    channel: String,
}

impl RedisFanout {
    /// Connect and verify the server answers PING
    pub async fn connect(config: &RedisConfig) -> Result<Self, FanoutError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| FanoutError::Connect(format!("invalid Redis URL: {e}")))?;

        let pool = PoolConfig::from_url(&config.url)
            .builder()
            .map_err(|e| FanoutError::Connect(format!("failed to create pool builder: {e}")))?
            .max_size(config.pool_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| FanoutError::Connect(format!("failed to create Redis pool: {e}")))?;

        let mut conn = pool
            .get()
            .await
            .map_err(|e| FanoutError::Connect(format!("failed to get Redis connection: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| FanoutError::Connect(format!("failed to ping Redis: {e}")))?;

        tracing::info!(url = %config.url, channel = %config.channel, "Connected to Redis");

        Ok(Self {
            client,
            pool,
            channel: config.channel.clone(),
        })
    }

    /// Connect, returning None if Redis is unavailable
    pub async fn try_connect(config: &RedisConfig) -> Option<Self> {
        match Self::connect(config).await {
            Ok(fanout) => Some(fanout),
            Err(e) => {
                tracing::warn!(error = %e, "Redis unavailable, edits will stay on this process");
                None
            }
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

#[async_trait]
impl FanoutBridge for RedisFanout {
    async fn publish(&self, update: &DocumentUpdate) -> Result<(), FanoutError> {
        let payload = update.encode()?;

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| FanoutError::Publish(e.to_string()))?;

        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(&payload)
            .query_async(&mut *conn)
            .await
            .map_err(|e| FanoutError::Publish(e.to_string()))?;

        tracing::trace!(
            channel = %self.channel,
            receivers,
            bytes = payload.len(),
            "Published update"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<FanoutStream, FanoutError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| FanoutError::Subscribe(e.to_string()))?;

        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| FanoutError::Subscribe(e.to_string()))?;

        tracing::info!(channel = %self.channel, "Subscribed to document updates");

        let updates = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => DocumentUpdate::decode(&payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping non-text fanout payload");
                    None
                }
            }
        });

        Ok(updates.boxed())
    }

    fn transport(&self) -> &'static str {
        "redis"
    }
}
