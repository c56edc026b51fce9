//! Download request states and lanes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::{ContentHash, RequestId, Uid};

/// Lifecycle state of a download request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestState {
    /// Waiting for an admission slot.
    Queued,
    /// Holds a slot and may be pulled.
    Active,
    /// Withdrawn by its owner.
    Cancelled,
    /// Pulled to the end.
    Completed,
}

impl RequestState {
    /// Whether the request has left the queue for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Allowed moves: Queued→Active, Queued→Cancelled, Active→Completed,
    /// Active→Cancelled.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Active)
                | (Self::Queued, Self::Cancelled)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission lane of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Normal,
    /// Reserved sub-pool served first.
    Priority,
}

impl Lane {
    pub fn from_priority(priority: bool) -> Self {
        if priority { Self::Priority } else { Self::Normal }
    }
}

/// One download request.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadRequest {
    pub id: RequestId,
    pub owner: Uid,
    /// Hashes in request order, without duplicates.
    pub hashes: Vec<ContentHash>,
    pub lane: Lane,
    pub state: RequestState,
    pub enqueued_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    /// Serial of the activation currently holding a slot.
    #[serde(skip)]
    pub(crate) activation: u64,
}
