//! Token validation configuration.

use serde::{Deserialize, Serialize};

/// JWT validation settings. Tokens are issued by the external account
/// service; this process only validates them and mints short-lived
/// service tokens for its own cross-process calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret.
    #[serde(default)]
    pub jwt_secret: String,
    /// Expected `iss` claim.
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Clock skew tolerance in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
    /// Lifetime of service-to-service tokens in seconds.
    #[serde(default = "default_service_ttl")]
    pub service_token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: default_issuer(),
            leeway_seconds: default_leeway(),
            service_token_ttl_seconds: default_service_ttl(),
        }
    }
}

fn default_issuer() -> String {
    "terasync".to_string()
}

fn default_leeway() -> u64 {
    30
}

fn default_service_ttl() -> u64 {
    300
}
