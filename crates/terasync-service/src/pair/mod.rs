//! Individual pair operations.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::Uid;
use terasync_entity::{Pair, PairStatus, UserData, UserPermissions};

use crate::directory::RelationshipDirectory;

/// One individual pair from the caller's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub user: UserData,
    pub status: PairStatus,
    /// What the caller grants the other side.
    pub own_permissions: Option<UserPermissions>,
    /// What the other side grants the caller.
    pub other_permissions: Option<UserPermissions>,
}

/// Adds, removes, and configures directed pair rows.
#[derive(Debug, Clone)]
pub struct PairService {
    directory: Arc<dyn RelationshipDirectory>,
}

impl PairService {
    pub fn new(directory: Arc<dyn RelationshipDirectory>) -> Self {
        Self { directory }
    }

    /// Add `other` as an individual pair of `actor`.
    pub async fn add(&self, actor: &Uid, other: &Uid) -> AppResult<PairInfo> {
        if actor == other {
            return Err(AppError::validation("You cannot pair with yourself"));
        }
        if self.directory.get_user(other).await?.is_none() {
            return Err(AppError::not_found(format!("User {other} not found")));
        }
        if self.directory.get_pair(actor, other).await?.is_some() {
            return Err(AppError::conflict(format!("Already paired with {other}")));
        }

        self.directory
            .upsert_pair(Pair {
                owner: actor.clone(),
                other: other.clone(),
                permissions: UserPermissions::default(),
                created_at: Utc::now(),
            })
            .await?;
        info!(uid = %actor, other = %other, "Pair added");
        self.info(actor, other).await
    }

    /// Remove the caller's row towards `other`.
    pub async fn remove(&self, actor: &Uid, other: &Uid) -> AppResult<()> {
        if !self.directory.delete_pair(actor, other).await? {
            return Err(AppError::not_found(format!("Not paired with {other}")));
        }
        info!(uid = %actor, other = %other, "Pair removed");
        Ok(())
    }

    /// Replace the caller's permissions towards `other`.
    pub async fn set_permissions(
        &self,
        actor: &Uid,
        other: &Uid,
        permissions: UserPermissions,
    ) -> AppResult<PairInfo> {
        let mut pair = self
            .directory
            .get_pair(actor, other)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Not paired with {other}")))?;
        pair.permissions = permissions;
        self.directory.upsert_pair(pair).await?;
        self.info(actor, other).await
    }

    /// Every pair the caller added, with the status of the reverse row.
    pub async fn list(&self, actor: &Uid) -> AppResult<Vec<PairInfo>> {
        let mut pairs = Vec::new();
        for pair in self.directory.pairs_from(actor).await? {
            pairs.push(self.info(actor, &pair.other).await?);
        }
        pairs.sort_by(|a, b| a.user.uid.cmp(&b.user.uid));
        Ok(pairs)
    }

    async fn info(&self, actor: &Uid, other: &Uid) -> AppResult<PairInfo> {
        let own = self.directory.get_pair(actor, other).await?;
        let theirs = self.directory.get_pair(other, actor).await?;
        let alias = self.directory.get_user(other).await?.and_then(|u| u.alias);
        Ok(PairInfo {
            user: UserData::new(other.clone(), alias),
            status: PairStatus::from_directions(own.is_some(), theirs.is_some()),
            own_permissions: own.map(|p| p.permissions),
            other_permissions: theirs.map(|p| p.permissions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terasync_core::ErrorKind;

    use crate::directory::MemoryDirectory;

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    async fn setup() -> PairService {
        let dir = Arc::new(MemoryDirectory::new());
        dir.ensure_user(&uid("A"), None).await;
        dir.ensure_user(&uid("B"), Some("Bee".to_string())).await;
        PairService::new(dir)
    }

    #[tokio::test]
    async fn test_status_follows_both_directions() {
        let pairs = setup().await;
        let one = pairs.add(&uid("A"), &uid("B")).await.unwrap();
        assert_eq!(one.status, PairStatus::OneSided);

        let both = pairs.add(&uid("B"), &uid("A")).await.unwrap();
        assert_eq!(both.status, PairStatus::Bidirectional);

        pairs.remove(&uid("B"), &uid("A")).await.unwrap();
        let listed = pairs.list(&uid("A")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, PairStatus::OneSided);
        assert_eq!(listed[0].user.alias.as_deref(), Some("Bee"));
    }

    #[tokio::test]
    async fn test_rejects_self_unknown_and_duplicate() {
        let pairs = setup().await;
        assert_eq!(
            pairs.add(&uid("A"), &uid("A")).await.unwrap_err().kind,
            ErrorKind::Validation
        );
        assert_eq!(
            pairs.add(&uid("A"), &uid("Z")).await.unwrap_err().kind,
            ErrorKind::NotFound
        );
        pairs.add(&uid("A"), &uid("B")).await.unwrap();
        assert_eq!(
            pairs.add(&uid("A"), &uid("B")).await.unwrap_err().kind,
            ErrorKind::Conflict
        );
    }

    #[tokio::test]
    async fn test_set_permissions() {
        let pairs = setup().await;
        pairs.add(&uid("A"), &uid("B")).await.unwrap();
        let updated = pairs
            .set_permissions(
                &uid("A"),
                &uid("B"),
                UserPermissions {
                    paused: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.own_permissions.unwrap().paused);
        assert!(updated.other_permissions.is_none());
    }
}
