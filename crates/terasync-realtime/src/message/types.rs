//! Server to client messages.

use serde::{Deserialize, Serialize};

use terasync_core::error::AppError;
use terasync_core::types::RequestId;
use terasync_entity::UserData;
use terasync_service::membership::VisiblePeer;

/// Severity of a [`OutboundMessage::ServerMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Information,
    Warning,
    Error,
}

/// Error part of a failed call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorBody {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.kind.code().to_string(),
            message: err.public_message(),
        }
    }
}

/// Messages pushed by the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Server-wide snapshot.
    SystemInfo { online_users: u64 },
    /// Human-readable notice.
    ServerMessage { severity: Severity, message: String },
    /// A download request became Active.
    DownloadReady { request_id: RequestId },
    /// A visible peer is online.
    UserOnline { peer: VisiblePeer },
    /// A peer went offline or stopped being visible.
    UserOffline { user: UserData },
    /// Relayed client payload.
    Payload {
        from: UserData,
        payload: serde_json::Value,
    },
    /// Reply to a client call.
    Response {
        id: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

impl OutboundMessage {
    pub fn info(message: impl Into<String>) -> Self {
        Self::ServerMessage {
            severity: Severity::Information,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::ServerMessage {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::ServerMessage {
            severity: Severity::Error,
            message: message.into(),
        }
    }

    /// Successful call response.
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self::Response {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed call response. Internal details are not exposed.
    pub fn failed(id: u64, err: &AppError) -> Self {
        Self::Response {
            id,
            ok: false,
            result: None,
            error: Some(ErrorBody::from(err)),
        }
    }
}
