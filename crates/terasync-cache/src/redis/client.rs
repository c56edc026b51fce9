//! Redis connection management.

use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;

/// Redis client wrapper with connection management.
#[derive(Debug, Clone)]
pub struct RedisClient {
    /// The raw client, kept for opening dedicated pub/sub connections.
    client: Client,
    /// Redis connection manager (multiplexed, reconnecting).
    conn: ConnectionManager,
    /// Key prefix for all keys.
    key_prefix: String,
}

impl RedisClient {
    /// Connect to Redis.
    pub async fn connect(url: &str, key_prefix: &str) -> AppResult<Self> {
        info!(url = %mask_redis_url(url), "Connecting to Redis");

        let client = Client::open(url).map_err(|e| {
            AppError::with_source(
                ErrorKind::StoreUnavailable,
                "Failed to create Redis client",
                e,
            )
        })?;

        let conn = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::StoreUnavailable, "Failed to connect to Redis", e)
        })?;

        info!("Successfully connected to Redis");
        Ok(Self {
            client,
            conn,
            key_prefix: key_prefix.to_string(),
        })
    }

    /// Get a mutable clone of the connection manager.
    pub fn conn_mut(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// The underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Build a full key with the configured prefix.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("{}{key}", self.key_prefix)
    }

    /// Return the key prefix.
    pub fn prefix(&self) -> &str {
        &self.key_prefix
    }
}

/// Mask password in Redis URL for safe logging.
fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****@{}", &url[..colon_pos], &url[at_pos + 1..]);
            }
        }
    }
    url.to_string()
}
