//! Request and response types of group operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::{GroupId, Uid};
use terasync_entity::{
    Group, GroupBan, GroupMember, GroupMemberRole, GroupPermissions,
    GroupUserPreferredPermissions, UserData,
};

/// Run derived validation and map failures into [`AppError`].
pub fn validate_request<T: Validate>(request: &T) -> AppResult<()> {
    request
        .validate()
        .map_err(|e| AppError::validation(format!("Invalid request: {e}")))
}

/// Create a group owned by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateGroupRequest {
    /// Optional vanity alias.
    #[validate(length(min = 3, max = 32))]
    pub alias: Option<String>,
}

/// Join a group by id or alias.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JoinGroupRequest {
    #[validate(length(min = 1, max = 64))]
    pub group: String,
    /// Group password or a temporary invite code.
    #[serde(default)]
    pub password: String,
}

/// Ban a member.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BanUserRequest {
    pub gid: GroupId,
    pub uid: Uid,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: String,
}

/// Prune members who have not logged in for `days`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PruneGroupRequest {
    pub gid: GroupId,
    #[validate(range(min = 1, max = 365))]
    pub days: u32,
    /// Remove the members instead of only counting them.
    #[serde(default)]
    pub execute: bool,
}

/// Mint temporary invites.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTempInvitesRequest {
    pub gid: GroupId,
    #[validate(range(min = 1))]
    pub amount: usize,
}

/// Replace the group password.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    pub gid: GroupId,
    #[validate(length(max = 128))]
    pub password: String,
}

/// Public view of a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInfo {
    pub gid: GroupId,
    pub alias: Option<String>,
    pub owner: Uid,
    pub permissions: GroupPermissions,
    pub member_count: usize,
}

impl GroupInfo {
    pub fn new(group: &Group, member_count: usize) -> Self {
        Self {
            gid: group.gid.clone(),
            alias: group.alias.clone(),
            owner: group.owner.clone(),
            permissions: group.permissions,
            member_count,
        }
    }
}

/// One member as listed to other members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberInfo {
    pub user: UserData,
    pub role: GroupMemberRole,
    pub preferred: GroupUserPreferredPermissions,
    pub joined_at: DateTime<Utc>,
}

impl GroupMemberInfo {
    pub fn new(member: &GroupMember, alias: Option<String>) -> Self {
        Self {
            user: UserData::new(member.uid.clone(), alias),
            role: member.role,
            preferred: member.preferred,
            joined_at: member.joined_at,
        }
    }
}

/// Result of creating a group. The plain password is only ever returned here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCreated {
    pub group: GroupInfo,
    pub password: String,
}

/// Result of joining a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupJoined {
    pub group: GroupInfo,
    pub members: Vec<GroupMemberInfo>,
}

/// What happened to the group when a member left.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupLeft {
    /// The group had no members left and was deleted.
    pub deleted: bool,
    /// Ownership moved to this member.
    pub new_owner: Option<Uid>,
}

/// One ban list entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannedUser {
    pub uid: Uid,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    pub banned_by: Uid,
}

impl From<GroupBan> for BannedUser {
    fn from(ban: GroupBan) -> Self {
        Self {
            uid: ban.uid,
            reason: ban.reason,
            banned_at: ban.banned_at,
            banned_by: ban.banned_by,
        }
    }
}

/// Result of a prune run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneResult {
    /// Members matching the inactivity cutoff.
    pub candidates: Vec<Uid>,
    /// Whether they were removed.
    pub executed: bool,
}
