//! In-process relationship directory.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::traits::upload::UploadLedger;
use terasync_core::types::{ContentHash, GroupId, Uid};
use terasync_entity::{Group, GroupBan, GroupMember, Pair, PendingUpload, TempInvite, User};

use super::{MembershipLimits, RelationshipDirectory};

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<Uid, User>,
    pairs: HashMap<(Uid, Uid), Pair>,
    groups: HashMap<GroupId, Group>,
    members: Vec<GroupMember>,
    bans: Vec<GroupBan>,
    invites: Vec<TempInvite>,
    uploads: HashMap<ContentHash, PendingUpload>,
}

impl DirectoryState {
    fn check_join_quota(&self, uid: &Uid, limits: MembershipLimits) -> AppResult<()> {
        let joined = self.members.iter().filter(|m| &m.uid == uid).count();
        if joined >= limits.max_groups_joined {
            return Err(AppError::quota_exceeded(format!(
                "You may be in at most {} groups",
                limits.max_groups_joined
            )));
        }
        Ok(())
    }
}

/// Directory held entirely in memory behind one lock, which makes every
/// multi-row operation atomic.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user that does not exist yet; existing rows are kept.
    pub async fn ensure_user(&self, uid: &Uid, alias: Option<String>) -> User {
        let mut state = self.state.write().await;
        state
            .users
            .entry(uid.clone())
            .or_insert_with(|| User {
                uid: uid.clone(),
                alias,
                last_logged_in: Utc::now(),
            })
            .clone()
    }

    /// Announce an upload whose bytes have not arrived yet.
    pub async fn record_pending_upload(&self, upload: PendingUpload) {
        let mut state = self.state.write().await;
        state.uploads.insert(upload.hash.clone(), upload);
    }

    /// Mark an upload as complete.
    pub async fn complete_upload(&self, hash: &ContentHash) -> bool {
        self.state.write().await.uploads.remove(hash).is_some()
    }

    /// Unfinished uploads of `uid`.
    pub async fn pending_uploads_of(&self, uid: &Uid) -> Vec<PendingUpload> {
        self.state
            .read()
            .await
            .uploads
            .values()
            .filter(|u| &u.uploader == uid)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RelationshipDirectory for MemoryDirectory {
    async fn get_user(&self, uid: &Uid) -> AppResult<Option<User>> {
        Ok(self.state.read().await.users.get(uid).cloned())
    }

    async fn upsert_user(&self, user: User) -> AppResult<()> {
        self.state.write().await.users.insert(user.uid.clone(), user);
        Ok(())
    }

    async fn record_login(
        &self,
        uid: &Uid,
        alias: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<User> {
        let mut state = self.state.write().await;
        let user = state.users.entry(uid.clone()).or_insert_with(|| User {
            uid: uid.clone(),
            alias: None,
            last_logged_in: at,
        });
        if let Some(alias) = alias {
            user.alias = Some(alias.to_string());
        }
        user.last_logged_in = at;
        Ok(user.clone())
    }

    async fn pairs_from(&self, uid: &Uid) -> AppResult<Vec<Pair>> {
        let state = self.state.read().await;
        Ok(state
            .pairs
            .values()
            .filter(|p| &p.owner == uid)
            .cloned()
            .collect())
    }

    async fn pairs_to(&self, uid: &Uid) -> AppResult<Vec<Pair>> {
        let state = self.state.read().await;
        Ok(state
            .pairs
            .values()
            .filter(|p| &p.other == uid)
            .cloned()
            .collect())
    }

    async fn get_pair(&self, owner: &Uid, other: &Uid) -> AppResult<Option<Pair>> {
        let state = self.state.read().await;
        Ok(state.pairs.get(&(owner.clone(), other.clone())).cloned())
    }

    async fn upsert_pair(&self, pair: Pair) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .pairs
            .insert((pair.owner.clone(), pair.other.clone()), pair);
        Ok(())
    }

    async fn delete_pair(&self, owner: &Uid, other: &Uid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .pairs
            .remove(&(owner.clone(), other.clone()))
            .is_some())
    }

    async fn get_group(&self, gid: &GroupId) -> AppResult<Option<Group>> {
        Ok(self.state.read().await.groups.get(gid).cloned())
    }

    async fn find_group(&self, gid_or_alias: &str) -> AppResult<Option<Group>> {
        let state = self.state.read().await;
        let found = state.groups.values().find(|g| {
            g.gid.as_str() == gid_or_alias
                || g.alias
                    .as_deref()
                    .is_some_and(|alias| alias.eq_ignore_ascii_case(gid_or_alias))
        });
        Ok(found.cloned())
    }

    async fn insert_group(
        &self,
        group: Group,
        owner: GroupMember,
        limits: MembershipLimits,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.groups.contains_key(&group.gid) {
            return Err(AppError::conflict(format!("Group {} already exists", group.gid)));
        }
        let owned = state.groups.values().filter(|g| g.owner == group.owner).count();
        if owned >= limits.max_groups_created {
            return Err(AppError::quota_exceeded(format!(
                "You may own at most {} groups",
                limits.max_groups_created
            )));
        }
        state.check_join_quota(&owner.uid, limits)?;
        state.groups.insert(group.gid.clone(), group);
        state.members.push(owner);
        Ok(())
    }

    async fn update_group(&self, group: Group) -> AppResult<()> {
        let mut state = self.state.write().await;
        match state.groups.get_mut(&group.gid) {
            Some(slot) => {
                *slot = group;
                Ok(())
            }
            None => Err(AppError::not_found(format!("Group {} not found", group.gid))),
        }
    }

    async fn delete_group(&self, gid: &GroupId) -> AppResult<bool> {
        let mut state = self.state.write().await;
        if state.groups.remove(gid).is_none() {
            return Ok(false);
        }
        state.members.retain(|m| &m.gid != gid);
        state.bans.retain(|b| &b.gid != gid);
        state.invites.retain(|i| &i.gid != gid);
        debug!(%gid, "Deleted group");
        Ok(true)
    }

    async fn groups_owned_by(&self, uid: &Uid) -> AppResult<Vec<Group>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .filter(|g| &g.owner == uid)
            .cloned()
            .collect())
    }

    async fn memberships_of(&self, uid: &Uid) -> AppResult<Vec<GroupMember>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .iter()
            .filter(|m| &m.uid == uid)
            .cloned()
            .collect())
    }

    async fn members_of(&self, gid: &GroupId) -> AppResult<Vec<GroupMember>> {
        let state = self.state.read().await;
        let mut members: Vec<GroupMember> = state
            .members
            .iter()
            .filter(|m| &m.gid == gid)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.joined_at);
        Ok(members)
    }

    async fn get_member(&self, gid: &GroupId, uid: &Uid) -> AppResult<Option<GroupMember>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .iter()
            .find(|m| &m.gid == gid && &m.uid == uid)
            .cloned())
    }

    async fn add_member(&self, member: GroupMember, limits: MembershipLimits) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state
            .members
            .iter()
            .any(|m| m.gid == member.gid && m.uid == member.uid)
        {
            return Err(AppError::conflict("Already a member of this group"));
        }
        let size = state.members.iter().filter(|m| m.gid == member.gid).count();
        if size >= limits.max_group_members {
            return Err(AppError::quota_exceeded(format!(
                "Group is full ({} members)",
                limits.max_group_members
            )));
        }
        state.check_join_quota(&member.uid, limits)?;
        state.members.push(member);
        Ok(())
    }

    async fn update_member(&self, member: GroupMember) -> AppResult<()> {
        let mut state = self.state.write().await;
        let slot = state
            .members
            .iter_mut()
            .find(|m| m.gid == member.gid && m.uid == member.uid)
            .ok_or_else(|| AppError::not_found("Membership not found"))?;
        *slot = member;
        Ok(())
    }

    async fn remove_member(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let before = state.members.len();
        state.members.retain(|m| !(&m.gid == gid && &m.uid == uid));
        Ok(state.members.len() != before)
    }

    async fn ban_member(&self, ban: GroupBan) -> AppResult<()> {
        let mut state = self.state.write().await;
        state
            .members
            .retain(|m| !(m.gid == ban.gid && m.uid == ban.uid));
        state
            .bans
            .retain(|b| !(b.gid == ban.gid && b.uid == ban.uid));
        state.bans.push(ban);
        Ok(())
    }

    async fn unban(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool> {
        let mut state = self.state.write().await;
        let before = state.bans.len();
        state.bans.retain(|b| !(&b.gid == gid && &b.uid == uid));
        Ok(state.bans.len() != before)
    }

    async fn bans_of(&self, gid: &GroupId) -> AppResult<Vec<GroupBan>> {
        let state = self.state.read().await;
        Ok(state
            .bans
            .iter()
            .filter(|b| &b.gid == gid)
            .cloned()
            .collect())
    }

    async fn is_banned(&self, gid: &GroupId, uid: &Uid) -> AppResult<bool> {
        let state = self.state.read().await;
        Ok(state.bans.iter().any(|b| &b.gid == gid && &b.uid == uid))
    }

    async fn add_invites(&self, invites: Vec<TempInvite>) -> AppResult<()> {
        self.state.write().await.invites.extend(invites);
        Ok(())
    }

    async fn consume_invite(
        &self,
        gid: &GroupId,
        code: &str,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.write().await;
        state.invites.retain(|i| i.is_valid_at(now));
        let position = state
            .invites
            .iter()
            .position(|i| &i.gid == gid && i.code == code);
        Ok(match position {
            Some(index) => {
                state.invites.swap_remove(index);
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl UploadLedger for MemoryDirectory {
    async fn discard_unfinished(&self, uid: &Uid) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let before = state.uploads.len();
        state.uploads.retain(|_, upload| &upload.uploader != uid);
        Ok((before - state.uploads.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use terasync_entity::{GroupMemberRole, GroupPermissions, GroupUserPreferredPermissions};

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    fn gid(s: &str) -> GroupId {
        GroupId::parse(s).unwrap()
    }

    fn member(g: &str, u: &str) -> GroupMember {
        GroupMember {
            gid: gid(g),
            uid: uid(u),
            role: GroupMemberRole::default(),
            preferred: GroupUserPreferredPermissions::default(),
            joined_at: Utc::now(),
        }
    }

    fn group(g: &str, owner: &str) -> Group {
        Group {
            gid: gid(g),
            owner: uid(owner),
            alias: Some("Raid".to_string()),
            password_hash: None,
            permissions: GroupPermissions::default(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ban_removes_membership_and_appends_ban() {
        let dir = MemoryDirectory::new();
        dir.insert_group(group("G1", "A"), member("G1", "A"), MembershipLimits::UNBOUNDED)
            .await
            .unwrap();
        dir.add_member(member("G1", "B"), MembershipLimits::UNBOUNDED)
            .await
            .unwrap();

        dir.ban_member(GroupBan {
            gid: gid("G1"),
            uid: uid("B"),
            reason: "spam".to_string(),
            banned_at: Utc::now(),
            banned_by: uid("A"),
        })
        .await
        .unwrap();

        assert!(dir.get_member(&gid("G1"), &uid("B")).await.unwrap().is_none());
        assert!(dir.is_banned(&gid("G1"), &uid("B")).await.unwrap());
        assert_eq!(dir.bans_of(&gid("G1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_group_cascades() {
        let dir = MemoryDirectory::new();
        dir.insert_group(group("G1", "A"), member("G1", "A"), MembershipLimits::UNBOUNDED)
            .await
            .unwrap();
        dir.add_member(member("G1", "B"), MembershipLimits::UNBOUNDED)
            .await
            .unwrap();
        assert!(dir.delete_group(&gid("G1")).await.unwrap());
        assert!(dir.memberships_of(&uid("B")).await.unwrap().is_empty());
        assert!(!dir.delete_group(&gid("G1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_add_member_enforces_limits_under_the_lock() {
        let dir = MemoryDirectory::new();
        let limits = MembershipLimits {
            max_group_members: 2,
            max_groups_joined: 1,
            max_groups_created: 1,
        };
        dir.insert_group(group("G1", "A"), member("G1", "A"), limits)
            .await
            .unwrap();
        dir.add_member(member("G1", "B"), limits).await.unwrap();

        let full = dir.add_member(member("G1", "C"), limits).await.unwrap_err();
        assert_eq!(full.kind, terasync_core::error::ErrorKind::QuotaExceeded);

        // B is already in one group.
        let mut g2 = group("G2", "D");
        g2.alias = None;
        dir.insert_group(g2, member("G2", "D"), limits).await.unwrap();
        let joined = dir.add_member(member("G2", "B"), limits).await.unwrap_err();
        assert_eq!(joined.kind, terasync_core::error::ErrorKind::QuotaExceeded);

        // A already owns one group.
        let mut g3 = group("G3", "A");
        g3.alias = None;
        let owned = dir
            .insert_group(g3, member("G3", "A"), limits)
            .await
            .unwrap_err();
        assert_eq!(owned.kind, terasync_core::error::ErrorKind::QuotaExceeded);
        assert_eq!(dir.members_of(&gid("G1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invites_are_single_use_and_expire() {
        let dir = MemoryDirectory::new();
        let now = Utc::now();
        dir.add_invites(vec![
            TempInvite {
                gid: gid("G1"),
                code: "fresh".to_string(),
                expires_at: now + Duration::hours(1),
            },
            TempInvite {
                gid: gid("G1"),
                code: "stale".to_string(),
                expires_at: now - Duration::hours(1),
            },
        ])
        .await
        .unwrap();

        assert!(dir.consume_invite(&gid("G1"), "fresh", now).await.unwrap());
        assert!(!dir.consume_invite(&gid("G1"), "fresh", now).await.unwrap());
        assert!(!dir.consume_invite(&gid("G1"), "stale", now).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_group_by_alias() {
        let dir = MemoryDirectory::new();
        dir.insert_group(group("G1", "A"), member("G1", "A"), MembershipLimits::UNBOUNDED)
            .await
            .unwrap();
        assert!(dir.find_group("raid").await.unwrap().is_some());
        assert!(dir.find_group("G1").await.unwrap().is_some());
        assert!(dir.find_group("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_discard_unfinished_uploads() {
        let dir = MemoryDirectory::new();
        let hash = ContentHash::parse(&"1".repeat(40)).unwrap();
        dir.record_pending_upload(PendingUpload {
            hash: hash.clone(),
            uploader: uid("A"),
            started_at: Utc::now(),
        })
        .await;
        assert_eq!(dir.discard_unfinished(&uid("B")).await.unwrap(), 0);
        assert_eq!(dir.discard_unfinished(&uid("A")).await.unwrap(), 1);
        assert!(dir.pending_uploads_of(&uid("A")).await.is_empty());
    }
}
