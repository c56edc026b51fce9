//! Application state shared across all handlers and extractors.

use std::sync::Arc;
use std::time::Instant;

use terasync_auth::JwtDecoder;
use terasync_core::config::AppConfig;
use terasync_queue::RequestQueue;
use terasync_realtime::RealtimeEngine;
use terasync_storage::StorageManager;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ────────────────────────────────────────
    /// Application configuration
    pub config: Arc<AppConfig>,

    // ── Auth ─────────────────────────────────────────────────
    /// Validates client and service tokens
    pub jwt_decoder: Arc<JwtDecoder>,

    // ── File distribution ────────────────────────────────────
    /// Local cache, origin, and single-flight provider
    pub storage: Arc<StorageManager>,
    /// Download request queue
    pub queue: RequestQueue,

    // ── Realtime ─────────────────────────────────────────────
    /// Hub engine; `None` on distribution-only processes
    pub realtime: Option<RealtimeEngine>,

    /// Process start, for the health endpoint
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        jwt_decoder: Arc<JwtDecoder>,
        storage: Arc<StorageManager>,
        queue: RequestQueue,
        realtime: Option<RealtimeEngine>,
    ) -> Self {
        Self {
            config,
            jwt_decoder,
            storage,
            queue,
            realtime,
            started_at: Instant::now(),
        }
    }
}
