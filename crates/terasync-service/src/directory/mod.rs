//! Contract with the persistent relationship store.
//!
//! Users, pairs, groups, memberships, bans, invites, and pending uploads are
//! owned by an external database. The hub only talks to it through
//! [`RelationshipDirectory`]; [`MemoryDirectory`] is the process-local
//! implementation used by the standalone server and by tests.

mod memory;

pub use memory::MemoryDirectory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use terasync_core::config::groups::GroupsConfig;
use terasync_core::result::AppResult;
use terasync_core::types::{GroupId, Uid};
use terasync_entity::{Group, GroupBan, GroupMember, Pair, TempInvite, User};

/// Quotas checked inside the write that adds a membership, so concurrent
/// joins and creations cannot overshoot them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipLimits {
    /// Members one group may hold.
    pub max_group_members: usize,
    /// Groups one user may belong to.
    pub max_groups_joined: usize,
    /// Groups one user may own.
    pub max_groups_created: usize,
}

impl MembershipLimits {
    /// No bounds at all.
    pub const UNBOUNDED: Self = Self {
        max_group_members: usize::MAX,
        max_groups_joined: usize::MAX,
        max_groups_created: usize::MAX,
    };
}

impl From<&GroupsConfig> for MembershipLimits {
    fn from(config: &GroupsConfig) -> Self {
        Self {
            max_group_members: config.max_group_members,
            max_groups_joined: config.max_groups_joined,
            max_groups_created: config.max_groups_created,
        }
    }
}

/// Read and write access to the social graph.
///
/// Methods that touch several rows (creating a group with its owner,
/// banning, deleting a group) must be atomic in the implementation.
#[async_trait]
pub trait RelationshipDirectory: Send + Sync + std::fmt::Debug + 'static {
    // ── Users ───────────────────────────────────────────────────────

    /// Look up a user.
    async fn get_user(&self, uid: &Uid) -> AppResult<Option<User>>;

    /// Insert or replace a user.
    async fn upsert_user(&self, user: User) -> AppResult<()>;

    /// Record a successful login, creating the user on first sight. A
    /// `Some` alias replaces the stored one.
    async fn record_login(&self, uid: &Uid, alias: Option<&str>, at: DateTime<Utc>)
    -> AppResult<User>;

    // ── Pairs ───────────────────────────────────────────────────────

    /// Rows where `uid` is the owner.
    async fn pairs_from(&self, uid: &Uid) -> AppResult<Vec<Pair>>;

    /// Rows where `uid` is the other side.
    async fn pairs_to(&self, uid: &Uid) -> AppResult<Vec<Pair>>;

    /// One directed row.
    async fn get_pair(&self, owner: &Uid, other: &Uid) -> AppResult<Option<Pair>>;

    /// Insert or replace a directed row.
    async fn upsert_pair(&self, pair: Pair) -> AppResult<()>;

    /// Remove a directed row. Returns whether it existed.
    async fn delete_pair(&self, owner: &Uid, other: &Uid) -> AppResult<bool>;

    // ── Groups ──────────────────────────────────────────────────────

    /// Look up a group by id.
    async fn get_group(&self, gid: &GroupId) -> AppResult<Option<Group>>;

    /// Look up a group by id or alias.
    async fn find_group(&self, gid_or_alias: &str) -> AppResult<Option<Group>>;

    /// Insert a group together with its owner's membership. Fails with
    /// `QuotaExceeded` when the owner already owns or belongs to as many
    /// groups as `limits` allow.
    async fn insert_group(
        &self,
        group: Group,
        owner: GroupMember,
        limits: MembershipLimits,
    ) -> AppResult<()>;

    /// Replace a group row.
    async fn update_group(&self, group: Group) -> AppResult<()>;

    /// Delete a group with its memberships, bans, and invites.
    async fn delete_group(&self, gid: &GroupId) -> AppResult<bool>;

    /// Groups owned by `uid`.
    async fn groups_owned_by(&self, uid: &Uid) -> AppResult<Vec<Group>>;

    // ── Members ─────────────────────────────────────────────────────

    /// Memberships of `uid` across all groups.
    async fn memberships_of(&self, uid: &Uid) -> AppResult<Vec<GroupMember>>;

    /// Members of `gid`, oldest first.
    async fn members_of(&self, gid: &GroupId) -> AppResult<Vec<GroupMember>>;

    /// One membership row.
    async fn get_member(&self, gid: &GroupId, uid: &Uid) -> AppResult<Option<GroupMember>>;

    /// Insert a membership row. Fails with `QuotaExceeded` when the group
    /// is full or the user is already in as many groups as `limits` allow.
    async fn add_member(&self, member: GroupMember, limits: MembershipLimits) -> AppResult<()>;

    /// Replace a membership row.
    async fn update_member(&self, member: GroupMember) -> AppResult<()>;

    /// Remove a membership row. Returns whether it existed.
    async fn remove_member(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool>;

    // ── Bans ────────────────────────────────────────────────────────

    /// Remove the banned user's membership and append the ban in one step.
    async fn ban_member(&self, ban: GroupBan) -> AppResult<()>;

    /// Lift a ban. Returns whether it existed.
    async fn unban(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool>;

    /// Ban list of a group.
    async fn bans_of(&self, gid: &GroupId) -> AppResult<Vec<GroupBan>>;

    /// Whether `uid` is banned from `gid`.
    async fn is_banned(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool>;

    // ── Invites ─────────────────────────────────────────────────────

    /// Store freshly minted invites.
    async fn add_invites(&self, invites: Vec<TempInvite>) -> AppResult<()>;

    /// Consume a valid invite. Returns whether one was consumed; expired
    /// invites are never accepted.
    async fn consume_invite(&self, gid: &GroupId, code: &str, now: DateTime<Utc>)
    -> AppResult<bool>;
}
