//! Connection table: the live local connection of each uid.

use std::sync::Arc;

use dashmap::DashMap;

use terasync_core::types::{ConnectionId, Uid};

use super::handle::ConnectionHandle;

/// At most one connection per uid; a newer one replaces the older.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    by_uid: DashMap<Uid, Arc<ConnectionHandle>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle`, returning the connection it replaced.
    pub fn insert(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        self.by_uid.insert(handle.uid().clone(), handle)
    }

    /// Remove the entry for `uid` only if it is still `conn_id`.
    pub fn remove_if_current(&self, uid: &Uid, conn_id: ConnectionId) -> bool {
        self.by_uid
            .remove_if(uid, |_, current| current.id == conn_id)
            .is_some()
    }

    pub fn get(&self, uid: &Uid) -> Option<Arc<ConnectionHandle>> {
        self.by_uid.get(uid).map(|entry| entry.value().clone())
    }

    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_uid.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }

    /// Remove every connection.
    pub fn drain(&self) -> Vec<Arc<ConnectionHandle>> {
        let all = self.all();
        self.by_uid.clear();
        all
    }
}
