//! Request DTOs. Query parameter names follow the client protocol.

use serde::Deserialize;

use terasync_core::error::AppError;
use terasync_core::types::{ContentHash, RequestId};

/// `?requestId=…`
#[derive(Debug, Clone, Deserialize)]
pub struct RequestIdQuery {
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
}

/// `?file=<hash>`
#[derive(Debug, Clone, Deserialize)]
pub struct FileQuery {
    pub file: String,
}

/// `?uid=…&requestId=…`
#[derive(Debug, Clone, Deserialize)]
pub struct SendReadyQuery {
    pub uid: String,
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
}

/// `?token=…` on the hub upgrade, for clients that cannot set headers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// Parse a list of hashes from a request body.
pub fn parse_hashes(raw: &[String]) -> Result<Vec<ContentHash>, AppError> {
    raw.iter().map(|h| ContentHash::parse(h)).collect()
}
