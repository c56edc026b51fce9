//! Unified application error types for TeraSync.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator. The HTTP layer and the hub layer
//! translate [`ErrorKind`] into their own wire representations.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The requested resource was not found.
    NotFound,
    /// The caller's identity could not be established (bad, expired or banned token).
    Authentication,
    /// The caller is known but may not perform the action.
    Authorization,
    /// Input validation failed.
    Validation,
    /// A download request id is unknown, not owned by the caller, or not in a usable state.
    AdmissionRejected,
    /// A configured quota (groups, members, invites) would be exceeded.
    QuotaExceeded,
    /// A conflict occurred (already a member, duplicate entry, etc.).
    Conflict,
    /// Fetching a blob from the origin store failed.
    OriginFetch,
    /// The shared presence store could not be reached.
    StoreUnavailable,
    /// A local storage I/O error occurred.
    Storage,
    /// A configuration error occurred.
    Configuration,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A call to another TeraSync process failed.
    ExternalService,
    /// An internal server error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl ErrorKind {
    /// Stable machine-readable code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Validation => "VALIDATION",
            Self::AdmissionRejected => "ADMISSION_REJECTED",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::Conflict => "CONFLICT",
            Self::OriginFetch => "ORIGIN_FETCH",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Storage => "STORAGE",
            Self::Configuration => "CONFIGURATION",
            Self::Serialization => "SERIALIZATION",
            Self::ExternalService => "EXTERNAL_SERVICE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Whether the message of an error of this kind may be shown to clients.
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Authentication
                | Self::Authorization
                | Self::Validation
                | Self::AdmissionRejected
                | Self::QuotaExceeded
                | Self::Conflict
        )
    }
}

/// The unified application error used throughout TeraSync.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Create an authorization error.
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create an admission-rejected error.
    pub fn admission_rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AdmissionRejected, message)
    }

    /// Create a quota-exceeded error.
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create an origin-fetch error.
    pub fn origin_fetch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OriginFetch, message)
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreUnavailable, message)
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an external-service error.
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalService, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Message safe to send to a client. Server-side details are replaced
    /// with a generic description.
    pub fn public_message(&self) -> String {
        if self.kind.is_client_facing() {
            self.message.clone()
        } else {
            match self.kind {
                ErrorKind::StoreUnavailable | ErrorKind::ExternalService => {
                    "Service temporarily unavailable".to_string()
                }
                _ => "An internal error occurred".to_string(),
            }
        }
    }
}

// The source chain is not clonable; clones keep kind and message only, which
// is what waiters on a shared fetch need.
impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Storage, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = AppError::internal("redis pool exhausted at 10.0.0.3");
        assert_eq!(err.public_message(), "An internal error occurred");

        let err = AppError::store_unavailable("connection refused");
        assert_eq!(err.public_message(), "Service temporarily unavailable");
    }

    #[test]
    fn test_client_facing_message_is_kept() {
        let err = AppError::quota_exceeded("You cannot create more than 3 groups");
        assert_eq!(err.public_message(), "You cannot create more than 3 groups");
        assert_eq!(err.kind.code(), "QUOTA_EXCEEDED");
    }

    #[test]
    fn test_clone_drops_source() {
        let io = std::io::Error::other("disk gone");
        let err: AppError = io.into();
        assert!(std::error::Error::source(&err).is_some());
        let cloned = err.clone();
        assert_eq!(cloned.kind, ErrorKind::Storage);
        assert!(std::error::Error::source(&cloned).is_none());
    }
}
