//! Route definitions.
//!
//! Paths follow the client protocol: `cache/`, `request/`, `distribution/`
//! and `main/` for file distribution, `/hub` for the realtime connection.
//! The hub and the ready bridge are only mounted when this process runs a
//! hub engine.

use axum::Router;
use axum::routing::{any, get, post};

use crate::handlers;
use crate::state::AppState;

/// Build the router with every route this process serves.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(file_routes())
        .merge(request_routes())
        .merge(health_routes());
    if state.realtime.is_some() {
        router = router.merge(hub_routes());
    }

    router.with_state(state)
}

/// Pulls and service-to-service blob transfer
fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/cache/get", get(handlers::cache::get_files))
        .route("/distribution/get", get(handlers::distribution::get_file))
}

/// Download request lifecycle
fn request_routes() -> Router<AppState> {
    Router::new()
        .route("/request/enqueue", post(handlers::request::enqueue))
        .route("/request/check", get(handlers::request::check).post(handlers::request::check))
        .route("/request/cancel", get(handlers::request::cancel))
}

/// Realtime hub and the inbound ready bridge
fn hub_routes() -> Router<AppState> {
    Router::new()
        .route("/hub", any(handlers::hub::hub_upgrade))
        .route("/main/sendReady", get(handlers::ready::send_ready))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
