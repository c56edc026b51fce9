//! Redis shared store implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;
use terasync_core::traits::store::SharedStore;

use super::client::RedisClient;

const DELETE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

const EXPIRE_IF_EQUALS: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

const SCAN_BATCH: usize = 500;

/// Redis-backed shared store.
#[derive(Debug, Clone)]
pub struct RedisStore {
    client: RedisClient,
    delete_if_equals: redis::Script,
    expire_if_equals: redis::Script,
}

impl RedisStore {
    /// Create a store over an established client.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            delete_if_equals: redis::Script::new(DELETE_IF_EQUALS),
            expire_if_equals: redis::Script::new(EXPIRE_IF_EQUALS),
        }
    }

    /// Map a Redis error to an AppError.
    fn map_err(e: redis::RedisError) -> AppError {
        AppError::with_source(ErrorKind::StoreUnavailable, format!("Redis error: {e}"), e)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    fn provider_type(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        let value: Option<String> = redis::cmd("GET")
            .arg(self.client.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(value)
    }

    async fn get_many(&self, keys: &[String]) -> AppResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let full_keys: Vec<String> = keys.iter().map(|k| self.client.prefixed_key(k)).collect();
        let mut conn = self.client.conn_mut();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(values)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let _: () = redis::cmd("SET")
            .arg(self.client.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let removed: i64 = redis::cmd("DEL")
            .arg(self.client.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let removed: i64 = self
            .delete_if_equals
            .key(self.client.prefixed_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(removed > 0)
    }

    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let refreshed: i64 = self
            .expire_if_equals
            .key(self.client.prefixed_key(key))
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(refreshed > 0)
    }

    async fn count_prefix(&self, prefix: &str) -> AppResult<u64> {
        let pattern = format!("{}*", self.client.prefixed_key(prefix));
        let mut conn = self.client.conn_mut();
        let mut cursor: u64 = 0;
        let mut total: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(Self::map_err)?;
            total += keys.len() as u64;
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern, total, "Counted keys by prefix");
        Ok(total)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::map_err)?;
        Ok(pong == "PONG")
    }
}
