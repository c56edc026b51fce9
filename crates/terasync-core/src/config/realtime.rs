//! Realtime hub configuration.

use serde::{Deserialize, Serialize};

/// Realtime hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Name of this shard, recorded in every session it owns.
    #[serde(default = "default_shard_name")]
    pub shard_name: String,
    /// Outbound message buffer per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Calls a single connection may have in flight; further calls wait.
    #[serde(default = "default_max_parallel_invocations")]
    pub max_parallel_invocations: usize,
    /// WebSocket ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// A connection silent for this long is considered gone.
    #[serde(default = "default_client_timeout")]
    pub client_timeout_seconds: u64,
    /// Interval of the online-count refresh, in seconds.
    #[serde(default = "default_system_info_interval")]
    pub system_info_interval_seconds: u64,
    /// Push refreshed system info to every local connection.
    #[serde(default = "default_true")]
    pub broadcast_system_info: bool,
    /// Whether a paused pair marked sticky keeps receiving presence events.
    #[serde(default)]
    pub sticky_pause_keeps_presence: bool,
    /// Shard bus provider: `"memory"` or `"redis"`.
    #[serde(default = "default_bus_provider")]
    pub bus_provider: String,
    /// Permissions advertised to newly connected clients.
    #[serde(default)]
    pub default_permissions: DefaultPermissionsConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            shard_name: default_shard_name(),
            channel_buffer_size: default_channel_buffer(),
            max_parallel_invocations: default_max_parallel_invocations(),
            ping_interval_seconds: default_ping_interval(),
            client_timeout_seconds: default_client_timeout(),
            system_info_interval_seconds: default_system_info_interval(),
            broadcast_system_info: true,
            sticky_pause_keeps_presence: false,
            bus_provider: default_bus_provider(),
            default_permissions: DefaultPermissionsConfig::default(),
        }
    }
}

/// Default permission toggles a client applies to new pairs and groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPermissionsConfig {
    #[serde(default)]
    pub disable_group_animations: bool,
    #[serde(default)]
    pub disable_group_sounds: bool,
    #[serde(default)]
    pub disable_group_vfx: bool,
    #[serde(default)]
    pub disable_individual_animations: bool,
    #[serde(default)]
    pub disable_individual_sounds: bool,
    #[serde(default)]
    pub disable_individual_vfx: bool,
    #[serde(default)]
    pub individual_is_sticky: bool,
}

fn default_shard_name() -> String {
    "main".to_string()
}

fn default_channel_buffer() -> usize {
    256
}

fn default_max_parallel_invocations() -> usize {
    10
}

fn default_ping_interval() -> u64 {
    30
}

fn default_client_timeout() -> u64 {
    90
}

fn default_system_info_interval() -> u64 {
    15
}

fn default_bus_provider() -> String {
    "memory".to_string()
}

fn default_true() -> bool {
    true
}
