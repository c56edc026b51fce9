//! Result types of peer resolution.

use serde::{Deserialize, Serialize};

use terasync_entity::UserData;

/// Which relation made a peer visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSource {
    /// A bidirectional individual pair.
    Individual,
    /// Shared group membership only.
    Group,
    /// Shared group membership with an individual row taking precedence.
    IndividualOverGroup,
}

/// Effective settings between the caller and one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPermissions {
    /// Either side has paused the relation.
    pub paused: bool,
    /// The individual settings are marked sticky.
    pub sticky: bool,
    pub disable_animations: bool,
    pub disable_sounds: bool,
    pub disable_vfx: bool,
}

/// A peer the caller can see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisiblePeer {
    pub user: UserData,
    pub permissions: PeerPermissions,
    pub source: PeerSource,
}
