//! # terasync-cache
//!
//! Shared store implementations backing the presence registry:
//!
//! - **memory**: process-local map with per-key expiry, for single-shard
//!   deployments and tests
//! - **redis**: Redis-backed store reachable from every hub instance
//!
//! The provider is selected at runtime based on configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::StoreManager;
