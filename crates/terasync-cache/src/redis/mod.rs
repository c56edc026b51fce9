//! Redis shared store.

mod client;
mod operations;

pub use client::RedisClient;
pub use operations::RedisStore;
