//! Presence store configuration.

use serde::{Deserialize, Serialize};

/// Shared presence store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Store provider: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis connection URL, used when `provider = "redis"`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Prefix for every key this server writes.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Lifetime of a session row without a heartbeat, in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_seconds: u64,
    /// Interval of the TTL sweep loop, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            session_ttl_seconds: default_session_ttl(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "terasync:".to_string()
}

fn default_session_ttl() -> u64 {
    90
}

fn default_sweep_interval() -> u64 {
    30
}
