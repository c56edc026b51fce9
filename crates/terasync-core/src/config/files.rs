//! File cache, origin, and admission configuration.

use serde::{Deserialize, Serialize};

/// File distribution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Directory holding locally cached blobs.
    #[serde(default = "default_cache_directory")]
    pub cache_directory: String,
    /// Where blobs come from on a cache miss.
    #[serde(default)]
    pub origin: OriginConfig,
    /// Maximum number of Active download requests.
    #[serde(default = "default_max_active")]
    pub max_active_requests: usize,
    /// Slots out of `max_active_requests` reserved for priority requesters.
    #[serde(default = "default_priority_lane")]
    pub priority_lane_size: usize,
    /// Fallback interval of the admission loop in milliseconds.
    #[serde(default = "default_admission_interval")]
    pub admission_interval_ms: u64,
    /// How long a validated local blob stays in the in-memory index.
    #[serde(default = "default_index_ttl")]
    pub index_ttl_seconds: u64,
    /// Maximum entries in the in-memory index.
    #[serde(default = "default_index_capacity")]
    pub index_capacity: u64,
    /// How activated requests are announced to their owners.
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            cache_directory: default_cache_directory(),
            origin: OriginConfig::default(),
            max_active_requests: default_max_active(),
            priority_lane_size: default_priority_lane(),
            admission_interval_ms: default_admission_interval(),
            index_ttl_seconds: default_index_ttl(),
            index_capacity: default_index_capacity(),
            notifier: NotifierConfig::default(),
        }
    }
}

/// Origin store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// `"local"` reads a cold-storage directory, `"http"` asks another server.
    #[serde(default = "default_origin_kind")]
    pub kind: String,
    /// Cold-storage directory for `kind = "local"`.
    #[serde(default = "default_origin_directory")]
    pub directory: String,
    /// Base URL of the upstream server for `kind = "http"`.
    #[serde(default)]
    pub url: String,
    /// Per-fetch timeout in seconds.
    #[serde(default = "default_origin_timeout")]
    pub timeout_seconds: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            kind: default_origin_kind(),
            directory: default_origin_directory(),
            url: String::new(),
            timeout_seconds: default_origin_timeout(),
        }
    }
}

/// Ready notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// `"local"` pushes through the in-process hub, `"http"` calls the main server.
    #[serde(default = "default_notifier_kind")]
    pub kind: String,
    /// Base URL of the main server for `kind = "http"`.
    #[serde(default)]
    pub main_url: String,
    /// Request timeout in seconds.
    #[serde(default = "default_notifier_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: default_notifier_kind(),
            main_url: String::new(),
            timeout_seconds: default_notifier_timeout(),
        }
    }
}

fn default_cache_directory() -> String {
    "data/cache".to_string()
}

fn default_max_active() -> usize {
    50
}

fn default_priority_lane() -> usize {
    10
}

fn default_admission_interval() -> u64 {
    250
}

fn default_index_ttl() -> u64 {
    300
}

fn default_index_capacity() -> u64 {
    100_000
}

fn default_origin_kind() -> String {
    "local".to_string()
}

fn default_origin_directory() -> String {
    "data/origin".to_string()
}

fn default_origin_timeout() -> u64 {
    60
}

fn default_notifier_kind() -> String {
    "local".to_string()
}

fn default_notifier_timeout() -> u64 {
    5
}
