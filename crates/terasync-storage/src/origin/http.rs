//! Upstream TeraSync server as origin.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::StatusCode;
use tracing::debug;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;
use terasync_core::traits::storage::ByteStream;
use terasync_core::types::ContentHash;

use super::{OriginStore, TokenSource};

/// Fetches blobs from another server's `distribution/get` endpoint.
#[derive(Clone)]
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: String,
    token: TokenSource,
}

impl std::fmt::Debug for HttpOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOrigin")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpOrigin {
    /// Create an origin client for `base_url`.
    pub fn new(base_url: &str, timeout: Duration, token: TokenSource) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl OriginStore for HttpOrigin {
    fn kind(&self) -> &str {
        "http"
    }

    async fn fetch(&self, hash: &ContentHash) -> AppResult<Option<ByteStream>> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/distribution/get", self.base_url),
            &[("file", hash.as_str())],
        )
        .map_err(|e| AppError::configuration(format!("Invalid origin URL: {e}")))?;

        let response = self
            .client
            .get(url)
            .bearer_auth((self.token)()?)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::OriginFetch, format!("Origin request for {hash} failed"), e)
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(%hash, "Origin does not have blob");
                Ok(None)
            }
            status if status.is_success() => {
                let stream = response.bytes_stream().map_err(std::io::Error::other);
                Ok(Some(Box::pin(stream)))
            }
            status => Err(AppError::origin_fetch(format!(
                "Origin answered {status} for {hash}"
            ))),
        }
    }
}
