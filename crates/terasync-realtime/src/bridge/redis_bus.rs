//! Redis pub/sub shard bus for multi-shard deployments.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use terasync_cache::redis::RedisClient;
use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;

use super::{ShardBus, ShardEnvelope};

/// One Redis channel per shard, named `<prefix>bus:<shard>`.
#[derive(Debug, Clone)]
pub struct RedisShardBus {
    client: RedisClient,
    buffer_size: usize,
}

impl RedisShardBus {
    pub fn new(client: RedisClient, buffer_size: usize) -> Self {
        Self {
            client,
            buffer_size: buffer_size.max(1),
        }
    }

    fn channel(&self, shard: &str) -> String {
        self.client.prefixed_key(&format!("bus:{shard}"))
    }
}

fn bus_error(message: &str, e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, message.to_string(), e)
}

#[async_trait]
impl ShardBus for RedisShardBus {
    fn provider_type(&self) -> &str {
        "redis"
    }

    async fn publish(&self, shard: &str, envelope: ShardEnvelope) -> AppResult<()> {
        let payload = serde_json::to_string(&envelope)?;
        let mut conn = self.client.conn_mut();
        redis::cmd("PUBLISH")
            .arg(self.channel(shard))
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| bus_error("Redis PUBLISH failed", e))?;
        Ok(())
    }

    async fn subscribe(&self, shard: &str) -> AppResult<mpsc::Receiver<ShardEnvelope>> {
        let channel = self.channel(shard);
        let mut pubsub = self
            .client
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| bus_error("Failed to open Redis pub/sub connection", e))?;
        pubsub
            .subscribe(&channel)
            .await
            .map_err(|e| bus_error("Redis SUBSCRIBE failed", e))?;
        info!(%channel, "Subscribed to shard bus");

        let (tx, rx) = mpsc::channel(self.buffer_size);
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "Unreadable shard bus payload");
                        continue;
                    }
                };
                match serde_json::from_str::<ShardEnvelope>(&payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Malformed shard bus envelope"),
                }
            }
            debug!(%channel, "Shard bus subscription ended");
        });
        Ok(rx)
    }
}
