//! Storage manager: builds the local cache, the origin, and the provider
//! from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use terasync_core::config::files::FilesConfig;
use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::traits::storage::BlobStore;

use crate::local::LocalBlobStore;
use crate::origin::{LocalOrigin, OriginStore, TokenSource};
use crate::provider::{CachedBlobProvider, ProviderOptions};
use crate::stats::FileStatistics;

/// Owns the storage components of one distribution process.
#[derive(Debug, Clone)]
pub struct StorageManager {
    local: Arc<LocalBlobStore>,
    origin: Arc<dyn OriginStore>,
    provider: CachedBlobProvider,
}

impl StorageManager {
    /// Build everything from `config`. `token` is used by the HTTP origin.
    pub async fn from_config(config: &FilesConfig, token: TokenSource) -> AppResult<Self> {
        let local = Arc::new(LocalBlobStore::new(&config.cache_directory).await?);
        let origin = build_origin(config, token).await?;
        info!(
            cache = %config.cache_directory,
            origin = origin.kind(),
            "Initialized blob storage"
        );

        let provider = CachedBlobProvider::new(
            Arc::clone(&local) as Arc<dyn BlobStore>,
            Arc::clone(&origin),
            Arc::new(FileStatistics::new()),
            ProviderOptions {
                index_ttl: Duration::from_secs(config.index_ttl_seconds),
                index_capacity: config.index_capacity,
            },
        );

        Ok(Self {
            local,
            origin,
            provider,
        })
    }

    /// Local cache directory.
    pub fn local(&self) -> &Arc<LocalBlobStore> {
        &self.local
    }

    /// Configured origin.
    pub fn origin(&self) -> &Arc<dyn OriginStore> {
        &self.origin
    }

    /// The single-flight cache provider.
    pub fn provider(&self) -> &CachedBlobProvider {
        &self.provider
    }
}

async fn build_origin(config: &FilesConfig, token: TokenSource) -> AppResult<Arc<dyn OriginStore>> {
    match config.origin.kind.as_str() {
        "local" => {
            let cold = LocalBlobStore::new(&config.origin.directory).await?;
            Ok(Arc::new(LocalOrigin::new(Arc::new(cold))))
        }
        #[cfg(feature = "http-origin")]
        "http" => Ok(Arc::new(crate::origin::HttpOrigin::new(
            &config.origin.url,
            Duration::from_secs(config.origin.timeout_seconds),
            token,
        )?)),
        other => Err(AppError::configuration(format!(
            "Unknown origin kind: '{other}'. Supported: local, http"
        ))),
    }
}
