//! In-memory shard bus for single-process deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

use terasync_core::result::AppResult;

use super::{ShardBus, ShardEnvelope};

/// In-process bus. Several engines in one process can share it.
#[derive(Debug)]
pub struct MemoryShardBus {
    /// Shard name → subscribers
    channels: RwLock<HashMap<String, Vec<mpsc::Sender<ShardEnvelope>>>>,
    /// Buffer size per subscriber
    buffer_size: usize,
}

impl MemoryShardBus {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            buffer_size: buffer_size.max(1),
        }
    }
}

#[async_trait]
impl ShardBus for MemoryShardBus {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn publish(&self, shard: &str, envelope: ShardEnvelope) -> AppResult<()> {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(shard) else {
            return Ok(());
        };
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            if tx.try_send(envelope.clone()).is_err() {
                warn!(shard, target = %envelope.target, "Shard bus subscriber lagging, message dropped");
            }
        }
        Ok(())
    }

    async fn subscribe(&self, shard: &str) -> AppResult<mpsc::Receiver<ShardEnvelope>> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        self.channels
            .write()
            .await
            .entry(shard.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::OutboundMessage;
    use terasync_core::types::Uid;

    fn envelope(n: u64) -> ShardEnvelope {
        ShardEnvelope::deliver(
            Uid::parse("u1").unwrap(),
            OutboundMessage::SystemInfo { online_users: n },
        )
    }

    #[tokio::test]
    async fn test_publish_reaches_only_that_shard_in_order() {
        let bus = MemoryShardBus::new(8);
        let mut east = bus.subscribe("east").await.unwrap();
        let mut west = bus.subscribe("west").await.unwrap();

        bus.publish("east", envelope(1)).await.unwrap();
        bus.publish("east", envelope(2)).await.unwrap();

        for expected in [1, 2] {
            match east.recv().await.unwrap().message {
                OutboundMessage::SystemInfo { online_users } => assert_eq!(online_users, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(west.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = MemoryShardBus::new(1);
        bus.publish("nobody", envelope(1)).await.unwrap();
    }
}
