//! Store manager that dispatches to the configured provider.

use std::sync::Arc;

use tracing::info;

use terasync_core::config::presence::PresenceConfig;
use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::traits::store::SharedStore;

/// Holds the configured shared store.
#[derive(Debug, Clone)]
pub struct StoreManager {
    inner: Arc<dyn SharedStore>,
    #[cfg(feature = "redis-backend")]
    redis: Option<crate::redis::RedisClient>,
}

impl StoreManager {
    /// Create the store selected by `config.provider`.
    pub async fn new(config: &PresenceConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis presence store");
                let client =
                    crate::redis::RedisClient::connect(&config.redis_url, &config.key_prefix)
                        .await?;
                let store = crate::redis::RedisStore::new(client.clone());
                Ok(Self {
                    inner: Arc::new(store),
                    redis: Some(client),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory presence store");
                Ok(Self::from_store(Arc::new(crate::memory::MemoryStore::new())))
            }
            other => Err(AppError::configuration(format!(
                "Unknown presence store provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Wrap an existing store (for testing).
    pub fn from_store(store: Arc<dyn SharedStore>) -> Self {
        Self {
            inner: store,
            #[cfg(feature = "redis-backend")]
            redis: None,
        }
    }

    /// The configured store.
    pub fn store(&self) -> Arc<dyn SharedStore> {
        Arc::clone(&self.inner)
    }

    /// The Redis client, when the Redis provider is in use.
    #[cfg(feature = "redis-backend")]
    pub fn redis_client(&self) -> Option<&crate::redis::RedisClient> {
        self.redis.as_ref()
    }
}
