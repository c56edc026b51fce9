//! Group (syncshell) limits.

use serde::{Deserialize, Serialize};

/// Limits enforced by group operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupsConfig {
    /// Maximum groups a user may own.
    #[serde(default = "default_max_created")]
    pub max_groups_created: usize,
    /// Maximum groups a user may be a member of, owned ones included.
    #[serde(default = "default_max_joined")]
    pub max_groups_joined: usize,
    /// Maximum members per group.
    #[serde(default = "default_max_members")]
    pub max_group_members: usize,
    /// Maximum temporary invites minted per call.
    #[serde(default = "default_max_temp_invites")]
    pub max_temp_invites: usize,
    /// Lifetime of temporary invites in hours.
    #[serde(default = "default_temp_invite_ttl")]
    pub temp_invite_ttl_hours: i64,
    /// Minimum length of a group password.
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            max_groups_created: default_max_created(),
            max_groups_joined: default_max_joined(),
            max_group_members: default_max_members(),
            max_temp_invites: default_max_temp_invites(),
            temp_invite_ttl_hours: default_temp_invite_ttl(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_max_created() -> usize {
    3
}

fn default_max_joined() -> usize {
    6
}

fn default_max_members() -> usize {
    100
}

fn default_max_temp_invites() -> usize {
    100
}

fn default_temp_invite_ttl() -> i64 {
    24
}

fn default_min_password_length() -> usize {
    10
}
