//! Server and CORS configuration.

use serde::{Deserialize, Serialize};

/// Which half of the system this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    /// Hub, presence, groups, and the file distribution endpoints.
    Main,
    /// File distribution endpoints only; readiness is forwarded to a main server.
    Distribution,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Process role.
    #[serde(default = "default_role")]
    pub role: ServerRole,
    /// Address clients use to reach the file distribution endpoints.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// CORS configuration.
    #[serde(default)]
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            role: default_role(),
            public_url: default_public_url(),
            body_limit_bytes: default_body_limit(),
            shutdown_grace_seconds: default_shutdown_grace(),
            cors: CorsConfig::default(),
        }
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Allowed origins. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    6000
}

fn default_role() -> ServerRole {
    ServerRole::Main
}

fn default_public_url() -> String {
    "http://localhost:6000".to_string()
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

fn default_shutdown_grace() -> u64 {
    10
}
