//! HTTP and WebSocket handlers.

pub mod cache;
pub mod distribution;
pub mod health;
pub mod hub;
pub mod ready;
pub mod request;
