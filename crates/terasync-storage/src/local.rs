//! Local filesystem blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::stream::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;
use terasync_core::traits::storage::{BlobMeta, BlobStore, ByteStream};
use terasync_core::types::ContentHash;

/// Directory below the root where partial writes live until complete.
const INCOMING_DIR: &str = ".incoming";

/// Content-addressed store on the local filesystem.
///
/// Blobs live at `<root>/<first two hash chars>/<HASH>`. Writes go to a
/// unique file under `<root>/.incoming` and are renamed into place once the
/// stream is exhausted, so a visible blob is always complete.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    /// Root directory for all stored blobs.
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at the given path.
    pub async fn new(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        fs::create_dir_all(root.join(INCOMING_DIR))
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create blob root: {}", root.display()),
                    e,
                )
            })?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of a blob.
    pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(hash.shard_prefix()).join(hash.as_str())
    }

    fn incoming_path(&self, hash: &ContentHash) -> PathBuf {
        self.root
            .join(INCOMING_DIR)
            .join(format!("{hash}.{}.part", Uuid::new_v4()))
    }

    async fn write_incoming(&self, path: &Path, mut stream: ByteStream) -> AppResult<u64> {
        let mut file = fs::File::create(path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create file: {}", path.display()),
                e,
            )
        })?;

        let mut total_bytes = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::with_source(ErrorKind::Storage, "Stream read error", e))?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).await.map_err(|e| {
                AppError::with_source(ErrorKind::Storage, "Failed to write chunk", e)
            })?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Storage, "Failed to flush file", e))?;
        Ok(total_bytes)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()))
    }

    async fn metadata(&self, hash: &ContentHash) -> AppResult<Option<BlobMeta>> {
        let path = self.blob_path(hash);
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to get metadata: {hash}"),
                    e,
                ));
            }
        };

        if !meta.is_file() || meta.len() == 0 {
            return Ok(None);
        }

        let last_modified = meta.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
        Ok(Some(BlobMeta {
            hash: hash.clone(),
            size_bytes: meta.len(),
            path,
            last_modified,
        }))
    }

    async fn read(&self, hash: &ContentHash) -> AppResult<ByteStream> {
        let file = fs::File::open(self.blob_path(hash)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Blob not found: {hash}"))
            } else {
                AppError::with_source(ErrorKind::Storage, format!("Failed to open blob: {hash}"), e)
            }
        })?;

        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn write_stream(&self, hash: &ContentHash, stream: ByteStream) -> AppResult<BlobMeta> {
        let incoming = self.incoming_path(hash);
        let written = match self.write_incoming(&incoming, stream).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&incoming).await {
                    warn!(path = %incoming.display(), error = %cleanup, "Failed to remove partial blob");
                }
                return Err(e);
            }
        };

        if written == 0 {
            let _ = fs::remove_file(&incoming).await;
            return Err(AppError::storage(format!("Refusing to store empty blob {hash}")));
        }

        let target = self.blob_path(hash);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create parent directory: {}", parent.display()),
                    e,
                )
            })?;
        }
        fs::rename(&incoming, &target).await.map_err(|e| {
            AppError::with_source(ErrorKind::Storage, format!("Failed to publish blob {hash}"), e)
        })?;

        debug!(%hash, bytes = written, "Stored blob");
        self.metadata(hash)
            .await?
            .ok_or_else(|| AppError::storage(format!("Blob {hash} vanished after write")))
    }

    async fn delete(&self, hash: &ContentHash) -> AppResult<bool> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete blob: {hash}"),
                e,
            )),
        }
    }
}
