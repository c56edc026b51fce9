//! Individual pair relation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::Uid;

use crate::permission::UserPermissions;

/// One direction of an individual pair: `owner` added `other`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pair {
    pub owner: Uid,
    pub other: Uid,
    /// What `owner` grants `other`.
    pub permissions: UserPermissions,
    pub created_at: DateTime<Utc>,
}

/// Status of the individual relation between two identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    /// Neither side added the other.
    None,
    /// Only one side added the other.
    OneSided,
    /// Both sides added each other.
    Bidirectional,
}

impl PairStatus {
    /// Derive the status from the two directed rows.
    pub fn from_directions(forward: bool, backward: bool) -> Self {
        match (forward, backward) {
            (true, true) => Self::Bidirectional,
            (false, false) => Self::None,
            _ => Self::OneSided,
        }
    }
}
