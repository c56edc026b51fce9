//! Content-addressable cache provider with single-flight origin fetches.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use moka::future::Cache;
use serde::Serialize;
use tracing::{debug, info, warn};

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;
use terasync_core::traits::storage::{BlobMeta, BlobStore};
use terasync_core::types::ContentHash;

use crate::origin::OriginStore;
use crate::stats::FileStatistics;

/// A blob that is complete in the local cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlobHandle {
    pub hash: ContentHash,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl From<BlobMeta> for BlobHandle {
    fn from(meta: BlobMeta) -> Self {
        Self {
            hash: meta.hash,
            path: meta.path,
            size_bytes: meta.size_bytes,
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<BlobHandle, AppError>>>;

/// Tuning for [`CachedBlobProvider`].
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    /// How long a validated blob is trusted without touching the filesystem.
    pub index_ttl: Duration,
    /// Maximum entries kept in the index.
    pub index_capacity: u64,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            index_ttl: Duration::from_secs(300),
            index_capacity: 100_000,
        }
    }
}

struct Inner {
    local: Arc<dyn BlobStore>,
    origin: Arc<dyn OriginStore>,
    /// One entry per hash currently being fetched from the origin.
    in_flight: DashMap<ContentHash, SharedFetch>,
    index: Cache<ContentHash, BlobHandle>,
    stats: Arc<FileStatistics>,
}

/// Makes blobs available locally, fetching each missing hash from the
/// origin exactly once even when many callers ask for it concurrently.
///
/// The single-flight map is scoped to this process; separate distribution
/// processes may each fetch the same hash once.
#[derive(Clone)]
pub struct CachedBlobProvider {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CachedBlobProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedBlobProvider")
            .field("local", &self.inner.local.provider_type())
            .field("origin", &self.inner.origin.kind())
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

impl CachedBlobProvider {
    /// Create a provider over a local store and an origin.
    pub fn new(
        local: Arc<dyn BlobStore>,
        origin: Arc<dyn OriginStore>,
        stats: Arc<FileStatistics>,
        options: ProviderOptions,
    ) -> Self {
        let index = Cache::builder()
            .max_capacity(options.index_capacity)
            .time_to_live(options.index_ttl)
            .build();

        Self {
            inner: Arc::new(Inner {
                local,
                origin,
                in_flight: DashMap::new(),
                index,
                stats,
            }),
        }
    }

    /// Usage statistics.
    pub fn stats(&self) -> &Arc<FileStatistics> {
        &self.inner.stats
    }

    /// Number of hashes currently being fetched.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Ensure `hash` is complete in the local cache and return its handle.
    ///
    /// A miss joins the in-flight fetch for the hash or starts one. Every
    /// caller joined to the same fetch observes the same outcome. A failed
    /// fetch leaves no marker behind, so the next call retries.
    pub async fn ensure(&self, hash: &ContentHash) -> AppResult<BlobHandle> {
        if let Some(handle) = self.lookup_local(hash).await? {
            self.inner.stats.record_hit(hash);
            return Ok(handle);
        }

        self.inner.stats.record_miss();
        self.join_or_start_fetch(hash).await
    }

    /// Start fetches for `hashes` in the background without waiting.
    pub fn prewarm(&self, hashes: &[ContentHash]) {
        for hash in hashes {
            let provider = self.clone();
            let hash = hash.clone();
            tokio::spawn(async move {
                if let Err(e) = provider.ensure(&hash).await {
                    debug!(%hash, error = %e, "Pre-warm fetch failed");
                }
            });
        }
    }

    /// Drop a hash from the index, e.g. after an external sweep removed it.
    pub async fn forget(&self, hash: &ContentHash) {
        self.inner.index.invalidate(hash).await;
    }

    /// Handle of a blob already in the local cache, without fetching.
    pub async fn lookup_local(&self, hash: &ContentHash) -> AppResult<Option<BlobHandle>> {
        if let Some(handle) = self.inner.index.get(hash).await {
            return Ok(Some(handle));
        }

        match self.inner.local.metadata(hash).await? {
            Some(meta) => {
                let handle = BlobHandle::from(meta);
                self.inner.index.insert(hash.clone(), handle.clone()).await;
                Ok(Some(handle))
            }
            None => Ok(None),
        }
    }

    fn join_or_start_fetch(&self, hash: &ContentHash) -> SharedFetch {
        match self.inner.in_flight.entry(hash.clone()) {
            Entry::Occupied(entry) => {
                self.inner.stats.record_coalesced();
                debug!(%hash, "Joining in-flight origin fetch");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let provider = self.clone();
                let key = hash.clone();
                // The fetch runs on its own task so that it completes even if
                // every waiting caller goes away.
                let task = tokio::spawn(async move {
                    let result = provider.fetch_from_origin(&key).await;
                    provider.inner.in_flight.remove(&key);
                    result
                });
                let fetch = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(AppError::internal(format!("Blob fetch task failed: {e}")))
                    })
                }
                .boxed()
                .shared();
                entry.insert(fetch.clone());
                fetch
            }
        }
    }

    async fn fetch_from_origin(&self, hash: &ContentHash) -> AppResult<BlobHandle> {
        // A previous fetch may have completed between the caller's miss and
        // this task claiming the in-flight slot.
        if let Some(handle) = self.lookup_local(hash).await? {
            return Ok(handle);
        }

        let stream = match self.inner.origin.fetch(hash).await {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                self.inner.stats.record_origin_failure();
                warn!(%hash, origin = self.inner.origin.kind(), "Blob missing on origin");
                return Err(AppError::not_found(format!("Blob {hash} not found on origin")));
            }
            Err(e) => {
                self.inner.stats.record_origin_failure();
                warn!(%hash, error = %e, "Origin fetch failed");
                return Err(AppError::with_source(
                    ErrorKind::OriginFetch,
                    format!("Failed to fetch {hash} from origin"),
                    e,
                ));
            }
        };

        let meta = self.inner.local.write_stream(hash, stream).await.map_err(|e| {
            self.inner.stats.record_origin_failure();
            warn!(%hash, error = %e, "Persisting origin blob failed");
            AppError::with_source(
                ErrorKind::OriginFetch,
                format!("Failed to persist {hash} from origin"),
                e,
            )
        })?;

        let handle = BlobHandle::from(meta);
        self.inner.index.insert(hash.clone(), handle.clone()).await;
        self.inner.stats.record_origin_fetch(hash, handle.size_bytes);
        info!(%hash, bytes = handle.size_bytes, "Fetched blob from origin");
        Ok(handle)
    }
}
