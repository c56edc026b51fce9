//! Shard bus: delivery of hub messages to connections on other shards.
//!
//! Each shard subscribes to its own channel. A shard that needs to reach a
//! uid whose session lives elsewhere publishes a [`ShardEnvelope`] on the
//! owning shard's channel; the owner delivers it locally.

pub mod memory_bus;
#[cfg(feature = "redis-bus")]
pub mod redis_bus;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use terasync_cache::StoreManager;
use terasync_core::config::realtime::RealtimeConfig;
use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::{ConnectionId, Uid};

use crate::message::OutboundMessage;

pub use memory_bus::MemoryShardBus;
#[cfg(feature = "redis-bus")]
pub use redis_bus::RedisShardBus;

/// A message addressed to one uid on another shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardEnvelope {
    pub target: Uid,
    pub message: OutboundMessage,
    /// When set, the owning shard closes this connection of `target` after
    /// delivering `message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<ConnectionId>,
}

impl ShardEnvelope {
    pub fn deliver(target: Uid, message: OutboundMessage) -> Self {
        Self {
            target,
            message,
            close: None,
        }
    }

    /// Ask the owning shard to close `connection` of `target`.
    pub fn close(target: Uid, connection: ConnectionId, message: OutboundMessage) -> Self {
        Self {
            target,
            message,
            close: Some(connection),
        }
    }
}

/// Typed publish/subscribe between shards. Messages on one channel are
/// delivered in publish order.
#[async_trait]
pub trait ShardBus: Send + Sync + std::fmt::Debug + 'static {
    fn provider_type(&self) -> &str;

    /// Publish `envelope` on the channel of `shard`.
    async fn publish(&self, shard: &str, envelope: ShardEnvelope) -> AppResult<()>;

    /// Subscribe to the channel of `shard`.
    async fn subscribe(&self, shard: &str) -> AppResult<mpsc::Receiver<ShardEnvelope>>;
}

/// Create the bus selected by `config.bus_provider`. The Redis bus reuses
/// the connection of the Redis presence store.
pub fn build_bus(config: &RealtimeConfig, stores: &StoreManager) -> AppResult<Arc<dyn ShardBus>> {
    match config.bus_provider.as_str() {
        "memory" => {
            info!("Using in-process shard bus");
            Ok(Arc::new(MemoryShardBus::new(config.channel_buffer_size)))
        }
        #[cfg(feature = "redis-bus")]
        "redis" => {
            let client = stores.redis_client().ok_or_else(|| {
                AppError::configuration("realtime.bus_provider = \"redis\" requires presence.provider = \"redis\"")
            })?;
            info!("Using Redis shard bus");
            Ok(Arc::new(RedisShardBus::new(client.clone(), config.channel_buffer_size)))
        }
        other => {
            let _ = stores;
            Err(AppError::configuration(format!(
                "Unknown shard bus provider: '{other}'. Supported: memory, redis"
            )))
        }
    }
}
