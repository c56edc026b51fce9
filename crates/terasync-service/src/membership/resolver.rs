//! Computes which identities a user can see.
//!
//! A peer is visible when it is a non-banned co-member of one of the user's
//! groups or when both sides added each other individually. Pausing hides
//! the peer unless the individual settings are sticky and sticky pauses are
//! configured to keep presence.
//!
//! Merge rule when both relations apply to the same peer: an individual row
//! replaces the group-derived settings of the side that owns it; a side
//! without a row keeps its group-derived pause. Across several shared groups
//! a restriction holds only if every shared group imposes it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use terasync_core::result::AppResult;
use terasync_core::types::Uid;
use terasync_entity::{GroupMember, Pair, UserData, UserPermissions};

use super::peer::{PeerPermissions, PeerSource, VisiblePeer};
use crate::directory::RelationshipDirectory;

/// Group-derived link to one peer, folded over every shared group.
#[derive(Debug, Clone, Copy)]
struct GroupLink {
    self_paused: bool,
    other_paused: bool,
    link_paused: bool,
    disable_animations: bool,
    disable_sounds: bool,
    disable_vfx: bool,
}

impl GroupLink {
    fn from_group(own: &GroupMember, other: &GroupMember, group: &terasync_entity::Group) -> Self {
        let mine = own.preferred;
        let theirs = other.preferred;
        Self {
            self_paused: mine.paused,
            other_paused: theirs.paused,
            link_paused: mine.paused || theirs.paused,
            disable_animations: mine.disable_animations
                || theirs.disable_animations
                || group.permissions.disable_animations,
            disable_sounds: mine.disable_sounds
                || theirs.disable_sounds
                || group.permissions.disable_sounds,
            disable_vfx: mine.disable_vfx || theirs.disable_vfx || group.permissions.disable_vfx,
        }
    }

    fn fold(self, next: Self) -> Self {
        Self {
            self_paused: self.self_paused && next.self_paused,
            other_paused: self.other_paused && next.other_paused,
            link_paused: self.link_paused && next.link_paused,
            disable_animations: self.disable_animations && next.disable_animations,
            disable_sounds: self.disable_sounds && next.disable_sounds,
            disable_vfx: self.disable_vfx && next.disable_vfx,
        }
    }
}

fn from_individual(perms: &UserPermissions, paused: bool) -> PeerPermissions {
    PeerPermissions {
        paused,
        sticky: perms.sticky,
        disable_animations: perms.disable_animations,
        disable_sounds: perms.disable_sounds,
        disable_vfx: perms.disable_vfx,
    }
}

/// Resolves visible peer sets against the relationship directory.
///
/// Results are computed fresh on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct MembershipResolver {
    directory: Arc<dyn RelationshipDirectory>,
    sticky_pause_keeps_presence: bool,
}

impl MembershipResolver {
    /// Create a resolver.
    pub fn new(directory: Arc<dyn RelationshipDirectory>, sticky_pause_keeps_presence: bool) -> Self {
        Self {
            directory,
            sticky_pause_keeps_presence,
        }
    }

    /// The directory this resolver reads from.
    pub fn directory(&self) -> &Arc<dyn RelationshipDirectory> {
        &self.directory
    }

    /// Every peer `uid` can currently see, sorted by uid.
    pub async fn visible_peers(&self, uid: &Uid) -> AppResult<Vec<VisiblePeer>> {
        let outgoing: HashMap<Uid, Pair> = self
            .directory
            .pairs_from(uid)
            .await?
            .into_iter()
            .map(|p| (p.other.clone(), p))
            .collect();
        let incoming: HashMap<Uid, Pair> = self
            .directory
            .pairs_to(uid)
            .await?
            .into_iter()
            .map(|p| (p.owner.clone(), p))
            .collect();
        let links = self.group_links(uid).await?;

        let candidates: HashSet<&Uid> = outgoing
            .keys()
            .chain(incoming.keys())
            .chain(links.keys())
            .filter(|peer| *peer != uid)
            .collect();

        let mut peers = Vec::new();
        for peer in candidates {
            let resolved = match (outgoing.get(peer), incoming.get(peer), links.get(peer)) {
                (Some(mine), Some(theirs), link) => {
                    let mine = &mine.permissions;
                    let theirs = &theirs.permissions;
                    let permissions = PeerPermissions {
                        paused: mine.paused || theirs.paused,
                        sticky: mine.sticky || theirs.sticky,
                        disable_animations: mine.disable_animations || theirs.disable_animations,
                        disable_sounds: mine.disable_sounds || theirs.disable_sounds,
                        disable_vfx: mine.disable_vfx || theirs.disable_vfx,
                    };
                    let source = if link.is_some() {
                        PeerSource::IndividualOverGroup
                    } else {
                        PeerSource::Individual
                    };
                    Some((permissions, source))
                }
                (Some(mine), None, Some(link)) => Some((
                    from_individual(
                        &mine.permissions,
                        mine.permissions.paused || link.other_paused,
                    ),
                    PeerSource::IndividualOverGroup,
                )),
                (None, Some(theirs), Some(link)) => Some((
                    from_individual(
                        &theirs.permissions,
                        theirs.permissions.paused || link.self_paused,
                    ),
                    PeerSource::IndividualOverGroup,
                )),
                (None, None, Some(link)) => Some((
                    PeerPermissions {
                        paused: link.link_paused,
                        sticky: false,
                        disable_animations: link.disable_animations,
                        disable_sounds: link.disable_sounds,
                        disable_vfx: link.disable_vfx,
                    },
                    PeerSource::Group,
                )),
                // One-sided pair without a shared group.
                _ => None,
            };

            let Some((permissions, source)) = resolved else {
                continue;
            };
            if !self.is_visible(&permissions) {
                continue;
            }

            let user = match self.directory.get_user(peer).await? {
                Some(user) => user.data(),
                None => UserData::new(peer.clone(), None),
            };
            peers.push(VisiblePeer {
                user,
                permissions,
                source,
            });
        }

        peers.sort_by(|a, b| a.user.uid.cmp(&b.user.uid));
        debug!(%uid, peers = peers.len(), "Resolved visible peers");
        Ok(peers)
    }

    /// The uids of [`Self::visible_peers`].
    pub async fn visible_peer_uids(&self, uid: &Uid) -> AppResult<HashSet<Uid>> {
        Ok(self
            .visible_peers(uid)
            .await?
            .into_iter()
            .map(|p| p.user.uid)
            .collect())
    }

    fn is_visible(&self, permissions: &PeerPermissions) -> bool {
        !permissions.paused || (permissions.sticky && self.sticky_pause_keeps_presence)
    }

    async fn group_links(&self, uid: &Uid) -> AppResult<HashMap<Uid, GroupLink>> {
        let mut links: HashMap<Uid, GroupLink> = HashMap::new();
        for own in self.directory.memberships_of(uid).await? {
            let Some(group) = self.directory.get_group(&own.gid).await? else {
                continue;
            };
            let banned: HashSet<Uid> = self
                .directory
                .bans_of(&own.gid)
                .await?
                .into_iter()
                .map(|b| b.uid)
                .collect();
            if banned.contains(uid) {
                continue;
            }

            for other in self.directory.members_of(&own.gid).await? {
                if &other.uid == uid || banned.contains(&other.uid) {
                    continue;
                }
                let link = GroupLink::from_group(&own, &other, &group);
                links
                    .entry(other.uid.clone())
                    .and_modify(|existing| *existing = existing.fold(link))
                    .or_insert(link);
            }
        }
        Ok(links)
    }
}
