//! Permission flag sets.
//!
//! Three flag sets exist: what a user grants a specific pair partner
//! ([`UserPermissions`]), what a group owner sets for everyone
//! ([`GroupPermissions`]), and what a member chooses for themselves inside
//! one group ([`GroupUserPreferredPermissions`]).

use serde::{Deserialize, Serialize};

/// Directed permissions a user sets for one individual pair partner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPermissions {
    /// The partner's data and presence are not synced.
    pub paused: bool,
    /// Keep these settings even when group-derived ones would differ.
    pub sticky: bool,
    pub disable_animations: bool,
    pub disable_sounds: bool,
    pub disable_vfx: bool,
}

/// Group-wide settings controlled by the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupPermissions {
    pub disable_animations: bool,
    pub disable_sounds: bool,
    pub disable_vfx: bool,
    /// New members may not join while set.
    pub disable_invites: bool,
}

/// A member's own preferences inside one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupUserPreferredPermissions {
    /// The member has paused the whole group.
    pub paused: bool,
    pub disable_animations: bool,
    pub disable_sounds: bool,
    pub disable_vfx: bool,
}

impl GroupUserPreferredPermissions {
    /// Start from the group's settings so new members inherit them.
    pub fn inherit(group: &GroupPermissions) -> Self {
        Self {
            paused: false,
            disable_animations: group.disable_animations,
            disable_sounds: group.disable_sounds,
            disable_vfx: group.disable_vfx,
        }
    }
}
