//! Group operations and their admission rules.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::info;

use terasync_auth::password::{PasswordHasher, generate_secret};
use terasync_core::config::groups::GroupsConfig;
use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::{GroupId, Uid};
use terasync_entity::{
    Group, GroupBan, GroupMember, GroupMemberRole, GroupPermissions,
    GroupUserPreferredPermissions, TempInvite,
};

use super::dto::*;
use crate::directory::{MembershipLimits, RelationshipDirectory};

const GROUP_ID_PREFIX: &str = "TSV-";
const GROUP_ID_SECRET_LEN: usize = 10;
const GENERATED_PASSWORD_LEN: usize = 16;
const INVITE_CODE_LEN: usize = 12;

/// Manages group lifecycle, membership, bans, and invites.
#[derive(Debug, Clone)]
pub struct GroupService {
    /// Persistent relationship store.
    directory: Arc<dyn RelationshipDirectory>,
    /// Group password hasher.
    hasher: Arc<PasswordHasher>,
    /// Quotas.
    limits: GroupsConfig,
}

impl GroupService {
    /// Creates a new group service.
    pub fn new(
        directory: Arc<dyn RelationshipDirectory>,
        hasher: Arc<PasswordHasher>,
        limits: GroupsConfig,
    ) -> Self {
        Self {
            directory,
            hasher,
            limits,
        }
    }

    /// Create a group owned by `actor` with a generated password.
    pub async fn create(&self, actor: &Uid, request: CreateGroupRequest) -> AppResult<GroupCreated> {
        validate_request(&request)?;

        let owned = self.directory.groups_owned_by(actor).await?.len();
        if owned >= self.limits.max_groups_created {
            return Err(AppError::quota_exceeded(format!(
                "You may own at most {} groups",
                self.limits.max_groups_created
            )));
        }
        self.ensure_join_quota(actor).await?;

        if let Some(alias) = &request.alias {
            if self.directory.find_group(alias).await?.is_some() {
                return Err(AppError::conflict(format!("Alias '{alias}' is already taken")));
            }
        }

        let gid = GroupId::parse(format!(
            "{GROUP_ID_PREFIX}{}",
            generate_secret(GROUP_ID_SECRET_LEN).to_uppercase()
        ))?;
        let password = generate_secret(GENERATED_PASSWORD_LEN);
        let now = Utc::now();
        let permissions = GroupPermissions::default();

        let group = Group {
            gid: gid.clone(),
            owner: actor.clone(),
            alias: request.alias,
            password_hash: Some(self.hasher.hash_password(&password)?),
            permissions,
            created_at: now,
        };
        let owner = GroupMember {
            gid: gid.clone(),
            uid: actor.clone(),
            role: GroupMemberRole {
                moderator: false,
                pinned: true,
            },
            preferred: GroupUserPreferredPermissions::inherit(&permissions),
            joined_at: now,
        };
        self.directory
            .insert_group(group.clone(), owner, MembershipLimits::from(&self.limits))
            .await?;

        info!(%gid, owner = %actor, "Group created");
        Ok(GroupCreated {
            group: GroupInfo::new(&group, 1),
            password,
        })
    }

    /// Join a group by id or alias.
    ///
    /// Requires an existing group, no ban, no existing membership, free
    /// capacity, open invites, the joined-group quota, and either the
    /// password or a valid temporary invite.
    pub async fn join(&self, actor: &Uid, request: JoinGroupRequest) -> AppResult<GroupJoined> {
        validate_request(&request)?;

        let group = self
            .directory
            .find_group(request.group.trim())
            .await?
            .ok_or_else(|| AppError::not_found("Group not found"))?;
        let gid = &group.gid;

        if self.directory.is_banned(gid, actor).await? {
            return Err(AppError::authorization("You are banned from this group"));
        }
        if self.directory.get_member(gid, actor).await?.is_some() {
            return Err(AppError::conflict("Already a member of this group"));
        }
        if group.permissions.disable_invites {
            return Err(AppError::authorization("This group is not accepting new members"));
        }
        let members = self.directory.members_of(gid).await?;
        if members.len() >= self.limits.max_group_members {
            return Err(AppError::quota_exceeded(format!(
                "Group is full ({} members)",
                self.limits.max_group_members
            )));
        }
        self.ensure_join_quota(actor).await?;

        if let Some(hash) = &group.password_hash {
            let password_ok = !request.password.is_empty()
                && self.hasher.verify_password(&request.password, hash)?;
            if !password_ok
                && !self
                    .directory
                    .consume_invite(gid, &request.password, Utc::now())
                    .await?
            {
                return Err(AppError::authorization("Invalid group password"));
            }
        }

        let member = GroupMember {
            gid: gid.clone(),
            uid: actor.clone(),
            role: GroupMemberRole::default(),
            preferred: GroupUserPreferredPermissions::inherit(&group.permissions),
            joined_at: Utc::now(),
        };
        // The checks above fail fast; the directory enforces the bounds again
        // atomically with the insert.
        self.directory
            .add_member(member, MembershipLimits::from(&self.limits))
            .await?;
        info!(%gid, uid = %actor, "Joined group");

        let members = self.directory.members_of(gid).await?;
        let mut listed = Vec::with_capacity(members.len());
        for member in &members {
            listed.push(self.member_info(member).await?);
        }
        Ok(GroupJoined {
            group: GroupInfo::new(&group, members.len()),
            members: listed,
        })
    }

    /// Leave a group. An owner hands ownership over first; the last member
    /// leaving deletes the group.
    pub async fn leave(&self, actor: &Uid, gid: &GroupId) -> AppResult<GroupLeft> {
        let mut group = self.group(gid).await?;
        if !self.directory.remove_member(gid, actor).await? {
            return Err(AppError::not_found("You are not a member of this group"));
        }

        let remaining = self.directory.members_of(gid).await?;
        if remaining.is_empty() {
            self.directory.delete_group(gid).await?;
            info!(%gid, "Last member left, group deleted");
            return Ok(GroupLeft {
                deleted: true,
                new_owner: None,
            });
        }

        if &group.owner != actor {
            return Ok(GroupLeft::default());
        }

        // Moderators first, then pinned members, then the longest-standing member.
        let successor = remaining
            .iter()
            .find(|m| m.role.moderator)
            .or_else(|| remaining.iter().find(|m| m.role.pinned))
            .or_else(|| remaining.first())
            .map(|m| m.uid.clone())
            .ok_or_else(|| AppError::internal("No successor available"))?;

        group.owner = successor.clone();
        self.directory.update_group(group).await?;
        info!(%gid, from = %actor, to = %successor, "Ownership transferred on leave");
        Ok(GroupLeft {
            deleted: false,
            new_owner: Some(successor),
        })
    }

    /// Ban a member. Membership removal and the ban entry are one step.
    pub async fn ban(&self, actor: &Uid, request: BanUserRequest) -> AppResult<()> {
        validate_request(&request)?;
        let group = self.group(&request.gid).await?;
        let target = self.ensure_can_moderate(actor, &group, &request.uid).await?;

        self.directory
            .ban_member(GroupBan {
                gid: group.gid.clone(),
                uid: target.uid,
                reason: request.reason,
                banned_at: Utc::now(),
                banned_by: actor.clone(),
            })
            .await?;
        info!(gid = %group.gid, uid = %request.uid, by = %actor, "Member banned");
        Ok(())
    }

    /// Lift a ban.
    pub async fn unban(&self, actor: &Uid, gid: &GroupId, target: &Uid) -> AppResult<()> {
        let group = self.group(gid).await?;
        self.ensure_moderator(actor, &group).await?;
        if !self.directory.unban(gid, target).await? {
            return Err(AppError::not_found("User is not banned"));
        }
        info!(%gid, uid = %target, by = %actor, "Ban lifted");
        Ok(())
    }

    /// Remove a member without banning.
    pub async fn remove_user(&self, actor: &Uid, gid: &GroupId, target: &Uid) -> AppResult<()> {
        let group = self.group(gid).await?;
        self.ensure_can_moderate(actor, &group, target).await?;
        self.directory.remove_member(gid, target).await?;
        info!(%gid, uid = %target, by = %actor, "Member removed");
        Ok(())
    }

    /// Ban list of a group.
    pub async fn list_banned(&self, actor: &Uid, gid: &GroupId) -> AppResult<Vec<BannedUser>> {
        let group = self.group(gid).await?;
        self.ensure_moderator(actor, &group).await?;
        Ok(self
            .directory
            .bans_of(gid)
            .await?
            .into_iter()
            .map(BannedUser::from)
            .collect())
    }

    /// Replace the group-wide permission flags.
    pub async fn set_permissions(
        &self,
        actor: &Uid,
        gid: &GroupId,
        permissions: GroupPermissions,
    ) -> AppResult<GroupInfo> {
        let mut group = self.group(gid).await?;
        self.ensure_owner(actor, &group)?;
        group.permissions = permissions;
        self.directory.update_group(group.clone()).await?;
        let count = self.directory.members_of(gid).await?.len();
        Ok(GroupInfo::new(&group, count))
    }

    /// Set role bits of a member. Only the owner may grant or revoke
    /// moderator; moderators may pin and unpin.
    pub async fn set_user_info(
        &self,
        actor: &Uid,
        gid: &GroupId,
        target: &Uid,
        role: GroupMemberRole,
    ) -> AppResult<()> {
        let group = self.group(gid).await?;
        self.ensure_moderator(actor, &group).await?;
        let mut member = self
            .directory
            .get_member(gid, target)
            .await?
            .ok_or_else(|| AppError::not_found("User is not a member of this group"))?;

        if member.role.moderator != role.moderator {
            self.ensure_owner(actor, &group)?;
        }
        member.role = role;
        self.directory.update_member(member).await
    }

    /// Set the caller's own preferences for one group.
    pub async fn set_preferred_permissions(
        &self,
        actor: &Uid,
        gid: &GroupId,
        preferred: GroupUserPreferredPermissions,
    ) -> AppResult<()> {
        let mut member = self
            .directory
            .get_member(gid, actor)
            .await?
            .ok_or_else(|| AppError::not_found("You are not a member of this group"))?;
        member.preferred = preferred;
        self.directory.update_member(member).await
    }

    /// Hand ownership to another member.
    pub async fn change_ownership(&self, actor: &Uid, gid: &GroupId, new_owner: &Uid) -> AppResult<()> {
        let mut group = self.group(gid).await?;
        self.ensure_owner(actor, &group)?;
        if new_owner == actor {
            return Ok(());
        }
        let mut member = self
            .directory
            .get_member(gid, new_owner)
            .await?
            .ok_or_else(|| AppError::not_found("User is not a member of this group"))?;
        let owned = self.directory.groups_owned_by(new_owner).await?.len();
        if owned >= self.limits.max_groups_created {
            return Err(AppError::quota_exceeded("The new owner already owns too many groups"));
        }

        group.owner = new_owner.clone();
        self.directory.update_group(group).await?;
        member.role.pinned = true;
        self.directory.update_member(member).await?;
        info!(%gid, from = %actor, to = %new_owner, "Ownership transferred");
        Ok(())
    }

    /// Replace the group password.
    pub async fn change_password(&self, actor: &Uid, request: ChangePasswordRequest) -> AppResult<()> {
        validate_request(&request)?;
        let mut group = self.group(&request.gid).await?;
        self.ensure_owner(actor, &group)?;
        if request.password.chars().count() < self.limits.min_password_length {
            return Err(AppError::validation(format!(
                "Password must be at least {} characters",
                self.limits.min_password_length
            )));
        }
        group.password_hash = Some(self.hasher.hash_password(&request.password)?);
        self.directory.update_group(group).await
    }

    /// Delete a group. Returns the members it had.
    pub async fn delete(&self, actor: &Uid, gid: &GroupId) -> AppResult<Vec<Uid>> {
        let group = self.group(gid).await?;
        self.ensure_owner(actor, &group)?;
        let members = self.member_uids(gid).await?;
        self.directory.delete_group(gid).await?;
        info!(%gid, by = %actor, "Group deleted");
        Ok(members)
    }

    /// Find members whose last login is older than `days`, and remove them
    /// when `execute` is set. The owner, moderators, and pinned members are
    /// never candidates.
    pub async fn prune(&self, actor: &Uid, request: PruneGroupRequest) -> AppResult<PruneResult> {
        validate_request(&request)?;
        let group = self.group(&request.gid).await?;
        self.ensure_moderator(actor, &group).await?;

        let cutoff = Utc::now() - Duration::days(i64::from(request.days));
        let mut candidates = Vec::new();
        for member in self.directory.members_of(&group.gid).await? {
            if member.uid == group.owner || member.role.moderator || member.role.pinned {
                continue;
            }
            let Some(user) = self.directory.get_user(&member.uid).await? else {
                continue;
            };
            if user.last_logged_in < cutoff {
                candidates.push(member.uid);
            }
        }

        if request.execute {
            for uid in &candidates {
                self.directory.remove_member(&group.gid, uid).await?;
            }
            info!(gid = %group.gid, pruned = candidates.len(), "Group pruned");
        }
        Ok(PruneResult {
            candidates,
            executed: request.execute,
        })
    }

    /// Mint single-use invite codes.
    pub async fn create_temp_invites(
        &self,
        actor: &Uid,
        request: CreateTempInvitesRequest,
    ) -> AppResult<Vec<String>> {
        validate_request(&request)?;
        if request.amount > self.limits.max_temp_invites {
            return Err(AppError::quota_exceeded(format!(
                "At most {} invites per request",
                self.limits.max_temp_invites
            )));
        }
        let group = self.group(&request.gid).await?;
        self.ensure_moderator(actor, &group).await?;

        let expires_at = Utc::now() + Duration::hours(self.limits.temp_invite_ttl_hours);
        let invites: Vec<TempInvite> = (0..request.amount)
            .map(|_| TempInvite {
                gid: group.gid.clone(),
                code: generate_secret(INVITE_CODE_LEN),
                expires_at,
            })
            .collect();
        let codes = invites.iter().map(|i| i.code.clone()).collect();
        self.directory.add_invites(invites).await?;
        Ok(codes)
    }

    /// Groups the caller belongs to.
    pub async fn list(&self, actor: &Uid) -> AppResult<Vec<GroupInfo>> {
        let mut groups = Vec::new();
        for membership in self.directory.memberships_of(actor).await? {
            if let Some(group) = self.directory.get_group(&membership.gid).await? {
                let count = self.directory.members_of(&group.gid).await?.len();
                groups.push(GroupInfo::new(&group, count));
            }
        }
        groups.sort_by(|a, b| a.gid.cmp(&b.gid));
        Ok(groups)
    }

    /// Current member uids of a group.
    pub async fn member_uids(&self, gid: &GroupId) -> AppResult<Vec<Uid>> {
        Ok(self
            .directory
            .members_of(gid)
            .await?
            .into_iter()
            .map(|m| m.uid)
            .collect())
    }

    async fn group(&self, gid: &GroupId) -> AppResult<Group> {
        self.directory
            .get_group(gid)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Group {gid} not found")))
    }

    async fn ensure_join_quota(&self, actor: &Uid) -> AppResult<()> {
        let joined = self.directory.memberships_of(actor).await?.len();
        if joined >= self.limits.max_groups_joined {
            return Err(AppError::quota_exceeded(format!(
                "You may be in at most {} groups",
                self.limits.max_groups_joined
            )));
        }
        Ok(())
    }

    fn ensure_owner(&self, actor: &Uid, group: &Group) -> AppResult<()> {
        if &group.owner != actor {
            return Err(AppError::authorization("Only the group owner may do this"));
        }
        Ok(())
    }

    async fn ensure_moderator(&self, actor: &Uid, group: &Group) -> AppResult<()> {
        if &group.owner == actor {
            return Ok(());
        }
        match self.directory.get_member(&group.gid, actor).await? {
            Some(member) if member.role.moderator => Ok(()),
            _ => Err(AppError::authorization("Only moderators may do this")),
        }
    }

    /// Moderator check plus target rules: the owner is untouchable and only
    /// the owner may act on moderators.
    async fn ensure_can_moderate(
        &self,
        actor: &Uid,
        group: &Group,
        target: &Uid,
    ) -> AppResult<GroupMember> {
        self.ensure_moderator(actor, group).await?;
        if target == actor {
            return Err(AppError::validation("You cannot do this to yourself"));
        }
        if target == &group.owner {
            return Err(AppError::authorization("The group owner cannot be removed"));
        }
        let member = self
            .directory
            .get_member(&group.gid, target)
            .await?
            .ok_or_else(|| AppError::not_found("User is not a member of this group"))?;
        if member.role.moderator && &group.owner != actor {
            return Err(AppError::authorization("Only the owner may act on moderators"));
        }
        Ok(member)
    }

    async fn member_info(&self, member: &GroupMember) -> AppResult<GroupMemberInfo> {
        let alias = self
            .directory
            .get_user(&member.uid)
            .await?
            .and_then(|u| u.alias);
        Ok(GroupMemberInfo::new(member, alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terasync_core::ErrorKind;
    use terasync_entity::User;

    use crate::directory::MemoryDirectory;

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    fn service_with(limits: GroupsConfig) -> (GroupService, Arc<MemoryDirectory>) {
        let dir = Arc::new(MemoryDirectory::new());
        let service = GroupService::new(dir.clone(), Arc::new(PasswordHasher::new()), limits);
        (service, dir)
    }

    fn service() -> (GroupService, Arc<MemoryDirectory>) {
        service_with(GroupsConfig::default())
    }

    async fn created(service: &GroupService, owner: &str) -> GroupCreated {
        service
            .create(&uid(owner), CreateGroupRequest::default())
            .await
            .unwrap()
    }

    async fn join(service: &GroupService, who: &str, created: &GroupCreated) -> AppResult<GroupJoined> {
        service
            .join(
                &uid(who),
                JoinGroupRequest {
                    group: created.group.gid.to_string(),
                    password: created.password.clone(),
                },
            )
            .await
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let (service, _) = service();
        let group = created(&service, "A").await;
        assert!(group.group.gid.as_str().starts_with(GROUP_ID_PREFIX));

        let joined = join(&service, "B", &group).await.unwrap();
        assert_eq!(joined.group.member_count, 2);
        assert_eq!(joined.members.len(), 2);

        let again = join(&service, "B", &group).await.unwrap_err();
        assert_eq!(again.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let (service, _) = service();
        let group = created(&service, "A").await;
        let err = service
            .join(
                &uid("B"),
                JoinGroupRequest {
                    group: group.group.gid.to_string(),
                    password: "not-it".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_creation_quota() {
        let (service, _) = service_with(GroupsConfig {
            max_groups_created: 1,
            ..Default::default()
        });
        created(&service, "A").await;
        let err = service
            .create(&uid("A"), CreateGroupRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_member_limit_and_join_quota() {
        let (service, _) = service_with(GroupsConfig {
            max_group_members: 2,
            max_groups_joined: 1,
            ..Default::default()
        });
        let g1 = created(&service, "A").await;
        join(&service, "B", &g1).await.unwrap();
        let full = join(&service, "C", &g1).await.unwrap_err();
        assert_eq!(full.kind, ErrorKind::QuotaExceeded);

        let g2 = created(&service, "D").await;
        let quota = join(&service, "B", &g2).await.unwrap_err();
        assert_eq!(quota.kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_respect_member_limit() {
        let (service, dir) = service_with(GroupsConfig {
            max_group_members: 2,
            ..Default::default()
        });
        let group = created(&service, "A").await;
        let gid = group.group.gid.clone();

        let mut tasks = Vec::new();
        for who in ["B", "C", "D"] {
            let service = service.clone();
            let request = JoinGroupRequest {
                group: gid.to_string(),
                password: group.password.clone(),
            };
            tasks.push(tokio::spawn(async move {
                service.join(&uid(who), request).await
            }));
        }

        let mut joined = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => joined += 1,
                Err(err) => assert_eq!(err.kind, ErrorKind::QuotaExceeded),
            }
        }
        assert_eq!(joined, 1);
        assert_eq!(dir.members_of(&gid).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_respect_ownership_quota() {
        let (service, dir) = service_with(GroupsConfig {
            max_groups_created: 1,
            ..Default::default()
        });

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                service.create(&uid("A"), CreateGroupRequest::default()).await
            }));
        }
        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(dir.groups_owned_by(&uid("A")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_banned_user_cannot_rejoin() {
        let (service, dir) = service();
        let group = created(&service, "A").await;
        join(&service, "B", &group).await.unwrap();

        service
            .ban(
                &uid("A"),
                BanUserRequest {
                    gid: group.group.gid.clone(),
                    uid: uid("B"),
                    reason: "griefing".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(dir.get_member(&group.group.gid, &uid("B")).await.unwrap().is_none());

        let err = join(&service, "B", &group).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        let banned = service.list_banned(&uid("A"), &group.group.gid).await.unwrap();
        assert_eq!(banned.len(), 1);
        assert_eq!(banned[0].reason, "griefing");

        service.unban(&uid("A"), &group.group.gid, &uid("B")).await.unwrap();
        join(&service, "B", &group).await.unwrap();
    }

    #[tokio::test]
    async fn test_only_owner_transfers_ownership() {
        let (service, dir) = service();
        let group = created(&service, "A").await;
        join(&service, "B", &group).await.unwrap();
        let gid = &group.group.gid;

        let err = service.change_ownership(&uid("B"), gid, &uid("B")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authorization);

        service.change_ownership(&uid("A"), gid, &uid("B")).await.unwrap();
        assert_eq!(dir.get_group(gid).await.unwrap().unwrap().owner, uid("B"));
    }

    #[tokio::test]
    async fn test_owner_leaving_prefers_moderator() {
        let (service, _) = service();
        let group = created(&service, "A").await;
        join(&service, "B", &group).await.unwrap();
        join(&service, "C", &group).await.unwrap();
        let gid = &group.group.gid;
        service
            .set_user_info(
                &uid("A"),
                gid,
                &uid("C"),
                GroupMemberRole {
                    moderator: true,
                    pinned: false,
                },
            )
            .await
            .unwrap();

        let left = service.leave(&uid("A"), gid).await.unwrap();
        assert_eq!(left.new_owner, Some(uid("C")));

        service.leave(&uid("B"), gid).await.unwrap();
        let last = service.leave(&uid("C"), gid).await.unwrap();
        assert!(last.deleted);
    }

    #[tokio::test]
    async fn test_prune_spares_protected_members() {
        let (service, dir) = service();
        let group = created(&service, "A").await;
        let gid = &group.group.gid;
        let long_ago = Utc::now() - Duration::days(30);
        for name in ["A", "B", "C", "D"] {
            dir.upsert_user(User {
                uid: uid(name),
                alias: None,
                last_logged_in: long_ago,
            })
            .await
            .unwrap();
        }
        for name in ["B", "C", "D"] {
            join(&service, name, &group).await.unwrap();
        }
        service
            .set_user_info(
                &uid("A"),
                gid,
                &uid("C"),
                GroupMemberRole {
                    moderator: false,
                    pinned: true,
                },
            )
            .await
            .unwrap();
        dir.record_login(&uid("D"), None, Utc::now()).await.unwrap();

        let request = |execute| PruneGroupRequest {
            gid: gid.clone(),
            days: 7,
            execute,
        };
        let dry = service.prune(&uid("A"), request(false)).await.unwrap();
        assert_eq!(dry.candidates, vec![uid("B")]);
        assert_eq!(service.member_uids(gid).await.unwrap().len(), 4);

        let done = service.prune(&uid("A"), request(true)).await.unwrap();
        assert!(done.executed);
        assert_eq!(service.member_uids(gid).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_temp_invite_replaces_password_once() {
        let (service, _) = service();
        let group = created(&service, "A").await;
        let codes = service
            .create_temp_invites(
                &uid("A"),
                CreateTempInvitesRequest {
                    gid: group.group.gid.clone(),
                    amount: 1,
                },
            )
            .await
            .unwrap();
        let with_code = || JoinGroupRequest {
            group: group.group.gid.to_string(),
            password: codes[0].clone(),
        };

        service.join(&uid("B"), with_code()).await.unwrap();
        let reused = service.join(&uid("C"), with_code()).await.unwrap_err();
        assert_eq!(reused.kind, ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_change_password_enforces_min_length() {
        let (service, _) = service();
        let group = created(&service, "A").await;
        let short = service
            .change_password(
                &uid("A"),
                ChangePasswordRequest {
                    gid: group.group.gid.clone(),
                    password: "short".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(short.kind, ErrorKind::Validation);
    }
}
