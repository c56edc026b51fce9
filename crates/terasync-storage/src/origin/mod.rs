//! Origin stores: the source of truth a cache miss is filled from.

#[cfg(feature = "http-origin")]
mod http;
mod local;

use async_trait::async_trait;

use terasync_core::result::AppResult;
use terasync_core::traits::storage::ByteStream;
use terasync_core::types::ContentHash;

#[cfg(feature = "http-origin")]
pub use http::HttpOrigin;
pub use local::LocalOrigin;

/// Produces the bearer token sent with each upstream request.
pub type TokenSource = std::sync::Arc<dyn Fn() -> AppResult<String> + Send + Sync>;

/// A store that holds every uploaded blob.
#[async_trait]
pub trait OriginStore: Send + Sync + std::fmt::Debug + 'static {
    /// Short name for logs (e.g., "local", "http").
    fn kind(&self) -> &str;

    /// Open the blob for `hash`. `Ok(None)` means the origin does not have it.
    async fn fetch(&self, hash: &ContentHash) -> AppResult<Option<ByteStream>>;
}
