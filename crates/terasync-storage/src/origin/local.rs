//! Cold-storage directory as origin.

use std::sync::Arc;

use async_trait::async_trait;

use terasync_core::result::AppResult;
use terasync_core::traits::storage::{BlobStore, ByteStream};
use terasync_core::types::ContentHash;

use super::OriginStore;

/// Serves blobs out of another [`BlobStore`], usually the main server's
/// cold-storage directory.
#[derive(Debug, Clone)]
pub struct LocalOrigin {
    store: Arc<dyn BlobStore>,
}

impl LocalOrigin {
    /// Wrap a blob store.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OriginStore for LocalOrigin {
    fn kind(&self) -> &str {
        "local"
    }

    async fn fetch(&self, hash: &ContentHash) -> AppResult<Option<ByteStream>> {
        if self.store.metadata(hash).await?.is_none() {
            return Ok(None);
        }
        self.store.read(hash).await.map(Some)
    }
}
