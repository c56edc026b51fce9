//! # terasync-api
//!
//! HTTP API layer for TeraSync built on Axum.
//!
//! Provides the hub WebSocket upgrade, the file distribution endpoints
//! (`cache/get`, `request/*`, `distribution/get`, `main/sendReady`), the
//! health endpoint, token extractors, DTOs, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::build_app;
pub use error::ApiError;
pub use state::AppState;
