//! Upload ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::{ContentHash, Uid};

/// An upload that has been announced but whose bytes are not complete yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    pub hash: ContentHash,
    pub uploader: Uid,
    pub started_at: DateTime<Utc>,
}
