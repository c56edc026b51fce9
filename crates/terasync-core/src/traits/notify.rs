//! Ready-notification contract between the admission controller and the hub.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{RequestId, Uid};

/// Tells the owner of a download request that it became Active.
///
/// Implemented in-process by the realtime hub and out-of-process by an
/// HTTP client that calls the main server. Delivery is best effort: an
/// owner without a live session is silently skipped, and the client falls
/// back to polling `request/check`.
#[async_trait]
pub trait ReadyNotifier: Send + Sync + std::fmt::Debug + 'static {
    /// Announce that `request_id` owned by `uid` may now be pulled.
    async fn notify_ready(&self, uid: &Uid, request_id: RequestId) -> AppResult<()>;
}
