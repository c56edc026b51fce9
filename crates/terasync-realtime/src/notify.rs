//! In-process ready notifier.

use async_trait::async_trait;

use terasync_core::result::AppResult;
use terasync_core::traits::ReadyNotifier;
use terasync_core::types::{RequestId, Uid};

use crate::server::RealtimeEngine;

/// Pushes `download_ready` through the hub running in this process.
#[derive(Debug, Clone)]
pub struct HubReadyNotifier {
    engine: RealtimeEngine,
}

impl HubReadyNotifier {
    pub fn new(engine: RealtimeEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl ReadyNotifier for HubReadyNotifier {
    async fn notify_ready(&self, uid: &Uid, request_id: RequestId) -> AppResult<()> {
        self.engine.send_download_ready(uid, request_id).await;
        Ok(())
    }
}
