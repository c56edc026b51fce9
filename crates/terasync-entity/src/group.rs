//! Group (syncshell) models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::{GroupId, Uid};

use crate::permission::{GroupPermissions, GroupUserPreferredPermissions};

/// A group of users who all see each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Unique group identifier.
    pub gid: GroupId,
    /// Current owner.
    pub owner: Uid,
    /// Optional vanity alias.
    pub alias: Option<String>,
    /// Argon2 hash of the join password; `None` means no password is required.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Group-wide permission settings.
    pub permissions: GroupPermissions,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// The alias when set, otherwise the group id.
    pub fn alias_or_gid(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.gid.as_str())
    }
}

/// Role bits of a group member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupMemberRole {
    /// May ban, unban, remove, prune, and mint invites.
    pub moderator: bool,
    /// Protected from pruning.
    pub pinned: bool,
}

/// Membership of one user in one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub gid: GroupId,
    pub uid: Uid,
    pub role: GroupMemberRole,
    /// The member's own per-group preferences.
    pub preferred: GroupUserPreferredPermissions,
    pub joined_at: DateTime<Utc>,
}

/// A ban list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBan {
    pub gid: GroupId,
    /// The banned identity.
    pub uid: Uid,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    /// Who issued the ban.
    pub banned_by: Uid,
}

/// A single-use invite code accepted in place of the group password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempInvite {
    pub gid: GroupId,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl TempInvite {
    /// Whether the invite is still usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
