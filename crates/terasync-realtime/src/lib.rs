//! # terasync-realtime
//!
//! Realtime hub for TeraSync. Provides:
//!
//! - Connection lifecycle with last-connect-wins sessions per identity
//! - A presence registry shared by every hub shard
//! - Visible-peer online/offline propagation and payload relay
//! - Group and pair calls with peer diffing after each mutation
//! - A per-connection invocation guard
//! - A shard bus (in-memory or Redis pub/sub) for cross-shard delivery
//! - Background loops for system info and presence sweeping

pub mod bridge;
pub mod connection;
pub mod dispatch;
pub mod message;
pub mod notify;
pub mod presence;
pub mod server;
pub mod tasks;

pub use connection::handle::ConnectionHandle;
pub use notify::HubReadyNotifier;
pub use presence::registry::{PresenceRegistry, Session};
pub use server::{RealtimeEngine, RealtimeServices};
