//! Presence registry over the shared store.
//!
//! One row per UID under `presence:uid:<UID>` holding the serialized
//! [`Session`]. Rows expire unless refreshed by heartbeats. Refresh and
//! removal are conditional on the row still holding the caller's exact
//! session, so a stale connection never touches its successor's row.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use terasync_cache::keys;
use terasync_core::result::AppResult;
use terasync_core::traits::store::SharedStore;
use terasync_core::types::{ConnectionId, Uid};

/// Where an identity is connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: Uid,
    pub connection_id: ConnectionId,
    /// Name of the hub shard holding the connection.
    pub shard: String,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(uid: Uid, connection_id: ConnectionId, shard: impl Into<String>) -> Self {
        Self {
            uid,
            connection_id,
            shard: shard.into(),
            connected_at: Utc::now(),
        }
    }

    fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Registry of live sessions shared by every shard.
#[derive(Debug, Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn SharedStore>,
    ttl: Duration,
}

impl PresenceRegistry {
    pub fn new(store: Arc<dyn SharedStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Record `session` as the live session of its UID, replacing any
    /// previous one.
    pub async fn register(&self, session: &Session) -> AppResult<()> {
        self.store
            .set(&keys::presence(&session.uid), &session.encode()?, self.ttl)
            .await?;
        debug!(uid = %session.uid, conn = %session.connection_id, shard = %session.shard, "Session registered");
        Ok(())
    }

    /// Refresh the TTL of `session`, re-registering it when the row is
    /// missing. Returns whether the registry holds this session afterwards.
    pub async fn heartbeat(&self, session: &Session) -> bool {
        let key = keys::presence(&session.uid);
        let encoded = match session.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode session");
                return false;
            }
        };

        match self.store.expire_if_equals(&key, &encoded, self.ttl).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                warn!(uid = %session.uid, error = %e, "Presence store unavailable on heartbeat");
                return false;
            }
        }

        match self.store.get(&key).await {
            Ok(Some(_)) => {
                debug!(uid = %session.uid, "Session row belongs to a newer connection");
                false
            }
            Ok(None) => match self.store.set(&key, &encoded, self.ttl).await {
                Ok(()) => {
                    debug!(uid = %session.uid, "Session re-registered on heartbeat");
                    true
                }
                Err(e) => {
                    warn!(uid = %session.uid, error = %e, "Session re-registration failed");
                    false
                }
            },
            Err(e) => {
                warn!(uid = %session.uid, error = %e, "Presence store unavailable on heartbeat");
                false
            }
        }
    }

    /// Remove the row if it still holds `session`. Returns whether a row
    /// was removed.
    pub async fn unregister(&self, session: &Session) -> AppResult<bool> {
        let removed = self
            .store
            .delete_if_equals(&keys::presence(&session.uid), &session.encode()?)
            .await?;
        debug!(uid = %session.uid, removed, "Session unregistered");
        Ok(removed)
    }

    /// Live session of `uid`. Store failures degrade to `None`.
    pub async fn lookup(&self, uid: &Uid) -> Option<Session> {
        match self.store.get(&keys::presence(uid)).await {
            Ok(value) => value.and_then(|raw| decode(uid, &raw)),
            Err(e) => {
                warn!(%uid, error = %e, "Presence lookup failed, treating as offline");
                None
            }
        }
    }

    /// Live sessions of `uids`. Store failures degrade to an empty map.
    pub async fn lookup_many(&self, uids: &[Uid]) -> HashMap<Uid, Session> {
        if uids.is_empty() {
            return HashMap::new();
        }
        let keys: Vec<String> = uids.iter().map(keys::presence).collect();
        match self.store.get_many(&keys).await {
            Ok(values) => uids
                .iter()
                .zip(values)
                .filter_map(|(uid, raw)| {
                    raw.and_then(|raw| decode(uid, &raw))
                        .map(|session| (uid.clone(), session))
                })
                .collect(),
            Err(e) => {
                warn!(count = uids.len(), error = %e, "Presence bulk lookup failed");
                HashMap::new()
            }
        }
    }

    /// Number of live sessions across all shards.
    pub async fn online_count(&self) -> AppResult<u64> {
        self.store.count_prefix(keys::PRESENCE_PREFIX).await
    }

    /// Drop expired rows where the store keeps them around.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        self.store.purge_expired().await
    }
}

fn decode(uid: &Uid, raw: &str) -> Option<Session> {
    match serde_json::from_str(raw) {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(%uid, error = %e, "Ignoring malformed session row");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use terasync_cache::memory::MemoryStore;
    use terasync_core::error::AppError;

    const TTL: Duration = Duration::from_secs(30);

    fn uid(s: &str) -> Uid {
        Uid::parse(s).unwrap()
    }

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Arc::new(MemoryStore::new()), TTL)
    }

    #[tokio::test]
    async fn test_second_register_supersedes_first() {
        let registry = registry();
        let first = Session::new(uid("u1"), ConnectionId::new(), "main");
        let second = Session::new(uid("u1"), ConnectionId::new(), "main");

        registry.register(&first).await.unwrap();
        registry.register(&second).await.unwrap();
        assert_eq!(registry.online_count().await.unwrap(), 1);

        assert!(!registry.unregister(&first).await.unwrap());
        assert_eq!(
            registry.lookup(&uid("u1")).await.map(|s| s.connection_id),
            Some(second.connection_id)
        );
        assert!(!registry.heartbeat(&first).await);
        assert!(registry.heartbeat(&second).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_and_restores_row() {
        let registry = registry();
        let session = Session::new(uid("u1"), ConnectionId::new(), "main");
        registry.register(&session).await.unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.heartbeat(&session).await);
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(registry.lookup(&uid("u1")).await.is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(registry.lookup(&uid("u1")).await.is_none());
        assert!(registry.heartbeat(&session).await);
        assert!(registry.lookup(&uid("u1")).await.is_some());
    }

    #[tokio::test]
    async fn test_lookup_many_returns_online_subset() {
        let registry = registry();
        registry
            .register(&Session::new(uid("a"), ConnectionId::new(), "main"))
            .await
            .unwrap();
        registry
            .register(&Session::new(uid("c"), ConnectionId::new(), "shard-2"))
            .await
            .unwrap();

        let found = registry.lookup_many(&[uid("a"), uid("b"), uid("c")]).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[&uid("c")].shard, "shard-2");
    }

    #[derive(Debug)]
    struct DownStore;

    #[async_trait]
    impl SharedStore for DownStore {
        fn provider_type(&self) -> &str {
            "down"
        }
        async fn get(&self, _: &str) -> AppResult<Option<String>> {
            Err(AppError::store_unavailable("down"))
        }
        async fn get_many(&self, _: &[String]) -> AppResult<Vec<Option<String>>> {
            Err(AppError::store_unavailable("down"))
        }
        async fn set(&self, _: &str, _: &str, _: Duration) -> AppResult<()> {
            Err(AppError::store_unavailable("down"))
        }
        async fn delete(&self, _: &str) -> AppResult<bool> {
            Err(AppError::store_unavailable("down"))
        }
        async fn delete_if_equals(&self, _: &str, _: &str) -> AppResult<bool> {
            Err(AppError::store_unavailable("down"))
        }
        async fn expire_if_equals(&self, _: &str, _: &str, _: Duration) -> AppResult<bool> {
            Err(AppError::store_unavailable("down"))
        }
        async fn count_prefix(&self, _: &str) -> AppResult<u64> {
            Err(AppError::store_unavailable("down"))
        }
        async fn health_check(&self) -> AppResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_unknown() {
        let registry = PresenceRegistry::new(Arc::new(DownStore), TTL);
        let session = Session::new(uid("u1"), ConnectionId::new(), "main");
        assert!(registry.register(&session).await.is_err());
        assert!(registry.lookup(&uid("u1")).await.is_none());
        assert!(registry.lookup_many(&[uid("u1")]).await.is_empty());
        assert!(!registry.heartbeat(&session).await);
    }
}
