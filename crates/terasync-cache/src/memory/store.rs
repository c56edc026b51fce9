//! Process-local store built on a concurrent map with per-entry deadlines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use terasync_core::result::AppResult;
use terasync_core::traits::store::SharedStore;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-memory shared store.
///
/// Conditional operations run under the map's shard lock for the key, so
/// they are atomic with respect to each other. Expired entries are
/// invisible immediately and physically removed by [`SharedStore::purge_expired`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str, now: Instant) -> Option<String> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn provider_type(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.live_value(key, Instant::now()))
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        let now = Instant::now();
        Ok(keys.iter().map(|key| self.live_value(key, now)).collect())
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.is_live(now) && entry.value == expected)
            .is_some())
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) && entry.value == expected => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_prefix(&self, prefix: &str) -> AppResult<u64> {
        let now = Instant::now();
        let count = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && entry.value().is_live(now))
            .count();
        Ok(count as u64)
    }

    async fn purge_expired(&self) -> AppResult<u64> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let removed = before.saturating_sub(self.entries.len()) as u64;
        if removed > 0 {
            debug!(removed, "Purged expired store entries");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
