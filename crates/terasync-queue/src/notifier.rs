//! Ready notifications sent to the main server over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use terasync_core::error::{AppError, ErrorKind};
use terasync_core::result::AppResult;
use terasync_core::traits::ReadyNotifier;
use terasync_core::types::{RequestId, Uid};
use terasync_storage::origin::TokenSource;

/// Calls `main/sendReady` on the main server, which forwards the event to
/// the owner's hub session.
#[derive(Clone)]
pub struct HttpReadyNotifier {
    client: reqwest::Client,
    main_url: String,
    token: TokenSource,
}

impl std::fmt::Debug for HttpReadyNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReadyNotifier")
            .field("main_url", &self.main_url)
            .finish()
    }
}

impl HttpReadyNotifier {
    pub fn new(main_url: &str, timeout: Duration, token: TokenSource) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;
        Ok(Self {
            client,
            main_url: main_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint(&self, uid: &Uid, request_id: RequestId) -> AppResult<reqwest::Url> {
        let request_id = request_id.to_string();
        reqwest::Url::parse_with_params(
            &format!("{}/main/sendReady", self.main_url),
            &[("uid", uid.as_str()), ("requestId", request_id.as_str())],
        )
        .map_err(|e| AppError::configuration(format!("Invalid main server URL: {e}")))
    }
}

#[async_trait]
impl ReadyNotifier for HttpReadyNotifier {
    async fn notify_ready(&self, uid: &Uid, request_id: RequestId) -> AppResult<()> {
        let url = self.endpoint(uid, request_id)?;
        let response = self
            .client
            .get(url)
            .bearer_auth((self.token)()?)
            .send()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::ExternalService, "Main server unreachable", e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(format!(
                "Main server answered {status} to sendReady"
            )));
        }
        debug!(%uid, %request_id, "Ready notification forwarded");
        Ok(())
    }
}
