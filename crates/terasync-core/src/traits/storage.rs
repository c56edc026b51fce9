//! Blob store trait for content-addressed local and cold storage.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;
use crate::types::ContentHash;

/// Metadata about a stored blob.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlobMeta {
    /// Content hash of the blob.
    pub hash: ContentHash,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Absolute location on disk.
    pub path: PathBuf,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
}

/// A byte stream type used for reading and writing blob contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Content-addressed blob storage.
///
/// A blob is only visible through [`BlobStore::metadata`] and
/// [`BlobStore::read`] once it has been written completely.
#[async_trait]
pub trait BlobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Check whether the store is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Metadata of a complete blob, `None` when absent or empty.
    async fn metadata(&self, hash: &ContentHash) -> AppResult<Option<BlobMeta>>;

    /// Open a complete blob for streaming.
    async fn read(&self, hash: &ContentHash) -> AppResult<ByteStream>;

    /// Persist a stream as the blob `hash`. The blob becomes visible only
    /// after the stream has been fully written.
    async fn write_stream(&self, hash: &ContentHash, stream: ByteStream) -> AppResult<BlobMeta>;

    /// Remove a blob. Returns `true` if it existed.
    async fn delete(&self, hash: &ContentHash) -> AppResult<bool>;
}
