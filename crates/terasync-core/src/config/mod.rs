//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from a
//! default TOML file, an optional environment overlay, and `TERASYNC__`
//! environment variables. Each sub-module is one configuration section.

pub mod app;
pub mod auth;
pub mod files;
pub mod groups;
pub mod logging;
pub mod presence;
pub mod realtime;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::auth::AuthConfig;
use self::files::FilesConfig;
use self::groups::GroupsConfig;
use self::logging::LoggingConfig;
use self::presence::PresenceConfig;
use self::realtime::RealtimeConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token validation settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Shared presence store settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Realtime hub settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Group limits.
    #[serde(default)]
    pub groups: GroupsConfig,
    /// File cache and admission settings.
    #[serde(default)]
    pub files: FilesConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// `base` is the default file (with or without extension); a sibling
    /// `{env}.toml` overlays it when present, and `TERASYNC__SECTION__KEY`
    /// environment variables override both.
    pub fn load(base: &str, env: &str) -> Result<Self, AppError> {
        let base_path = Path::new(base);
        let overlay = base_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(env);

        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::from(overlay).required(false))
            .add_source(
                config::Environment::with_prefix("TERASYNC")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(AppError::configuration("auth.jwt_secret must be set"));
        }
        if self.files.max_active_requests == 0 {
            return Err(AppError::configuration(
                "files.max_active_requests must be at least 1",
            ));
        }
        if self.files.priority_lane_size >= self.files.max_active_requests {
            return Err(AppError::configuration(format!(
                "files.priority_lane_size ({}) must be smaller than files.max_active_requests ({})",
                self.files.priority_lane_size, self.files.max_active_requests
            )));
        }
        if self.realtime.max_parallel_invocations == 0 {
            return Err(AppError::configuration(
                "realtime.max_parallel_invocations must be at least 1",
            ));
        }
        if self.files.notifier.kind == "http" && self.files.notifier.main_url.is_empty() {
            return Err(AppError::configuration(
                "files.notifier.main_url is required for the http notifier",
            ));
        }
        if self.files.origin.kind == "http" && self.files.origin.url.is_empty() {
            return Err(AppError::configuration(
                "files.origin.url is required for the http origin",
            ));
        }
        Ok(())
    }
}
