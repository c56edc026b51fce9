//! Shared key/value store trait used for cross-shard presence.

use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;

/// A key/value store with per-key TTL, reachable from every hub instance.
///
/// Values are opaque strings (JSON). Implementations apply their own key
/// prefix. The conditional operations are atomic on the store side so that
/// concurrent hub instances never delete or refresh a row they do not own.
#[async_trait]
pub trait SharedStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "memory", "redis").
    fn provider_type(&self) -> &str;

    /// Get a value by key. Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Get several values at once; the result is positionally aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>>;

    /// Set a value with a TTL, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Delete `key` only if its current value equals `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool>;

    /// Reset the TTL of `key` only if its current value equals `expected`.
    async fn expire_if_equals(&self, key: &str, expected: &str, ttl: Duration)
    -> AppResult<bool>;

    /// Count live keys starting with `prefix`.
    async fn count_prefix(&self, prefix: &str) -> AppResult<u64>;

    /// Drop expired entries. Stores with native expiry return 0.
    async fn purge_expired(&self) -> AppResult<u64> {
        Ok(0)
    }

    /// Check that the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
