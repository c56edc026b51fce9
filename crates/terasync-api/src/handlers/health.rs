//! Health check handler.

use axum::Json;
use axum::extract::State;

use terasync_core::config::app::ServerRole;

use crate::dto::response::{ApiResponse, HealthResponse, HubHealth};
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let role = match state.config.server.role {
        ServerRole::Main => "main",
        ServerRole::Distribution => "distribution",
    };
    let hub = state.realtime.as_ref().map(|engine| HubHealth {
        shard: engine.shard_name().to_string(),
        connections: engine.connections.len(),
        online_users: engine.online_count(),
    });
    let provider = state.storage.provider();

    Json(ApiResponse::ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        role: role.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        hub,
        queue: state.queue.stats(),
        cache: provider.stats().snapshot(),
        cache_in_flight: provider.in_flight(),
    }))
}
