//! Response DTOs.

use serde::{Deserialize, Serialize};

use terasync_queue::{QueueStats, RequestState};
use terasync_storage::StatisticsSnapshot;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// State of a download request after `request/check` or `request/cancel`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestStateResponse {
    pub state: RequestState,
}

/// Health endpoint body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub role: String,
    pub uptime_seconds: u64,
    /// Present when this process serves the hub.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hub: Option<HubHealth>,
    pub queue: QueueStats,
    pub cache: StatisticsSnapshot,
    pub cache_in_flight: usize,
}

/// Hub part of [`HealthResponse`].
#[derive(Debug, Clone, Serialize)]
pub struct HubHealth {
    pub shard: String,
    pub connections: usize,
    pub online_users: u64,
}
