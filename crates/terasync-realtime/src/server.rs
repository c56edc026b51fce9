//! Top-level hub engine that ties the subsystems together.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use terasync_auth::PasswordHasher;
use terasync_core::config::AppConfig;
use terasync_core::config::realtime::{DefaultPermissionsConfig, RealtimeConfig};
use terasync_core::traits::{SharedStore, UploadLedger};
use terasync_core::types::{RequestId, Uid};
use terasync_entity::UserData;
use terasync_service::directory::RelationshipDirectory;
use terasync_service::group::GroupService;
use terasync_service::membership::{MembershipResolver, VisiblePeer};
use terasync_service::pair::PairService;

use crate::bridge::{ShardBus, ShardEnvelope};
use crate::connection::handle::ConnectionHandle;
use crate::connection::pool::ConnectionPool;
use crate::message::OutboundMessage;
use crate::presence::registry::{PresenceRegistry, Session};

/// Collaborators the engine is built from.
#[derive(Debug, Clone)]
pub struct RealtimeServices {
    /// Shared presence store.
    pub store: Arc<dyn SharedStore>,
    /// Cross-shard delivery.
    pub bus: Arc<dyn ShardBus>,
    /// Relationship store.
    pub directory: Arc<dyn RelationshipDirectory>,
    /// Unfinished upload bookkeeping, cleared on disconnect.
    pub uploads: Arc<dyn UploadLedger>,
    /// Group password hasher.
    pub hasher: Arc<PasswordHasher>,
}

/// Limits and addresses advertised to a connected client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub shard_name: String,
    pub max_groups_created: usize,
    pub max_groups_joined: usize,
    pub max_group_members: usize,
    pub file_server_address: String,
    pub invocation_limit: usize,
}

/// Reply to `get_connection_info`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub user: UserData,
    pub server_info: ServerInfo,
    pub default_permissions: DefaultPermissionsConfig,
}

/// Per-session call statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounters {
    pub calls: u64,
    pub failed_calls: u64,
    pub payloads_relayed: u64,
}

/// Central hub engine. Cheap to clone.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Local connections, one per uid.
    pub connections: Arc<ConnectionPool>,
    /// Presence rows shared by every shard.
    pub registry: Arc<PresenceRegistry>,
    /// Visibility computation.
    pub resolver: Arc<MembershipResolver>,
    /// Group operations.
    pub groups: Arc<GroupService>,
    /// Pair operations.
    pub pairs: Arc<PairService>,
    pub(crate) bus: Arc<dyn ShardBus>,
    pub(crate) directory: Arc<dyn RelationshipDirectory>,
    uploads: Arc<dyn UploadLedger>,
    pub(crate) config: Arc<RealtimeConfig>,
    server_info: Arc<ServerInfo>,
    counters: Arc<DashMap<Uid, SessionCounters>>,
    online_users: Arc<AtomicU64>,
    pub(crate) sweep_interval: Duration,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("shard", &self.config.shard_name)
            .field("connections", &self.connections.len())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates the engine and every hub subsystem.
    pub fn new(config: &AppConfig, services: RealtimeServices) -> Self {
        let registry = PresenceRegistry::new(
            services.store.clone(),
            Duration::from_secs(config.presence.session_ttl_seconds),
        );
        let resolver = MembershipResolver::new(
            services.directory.clone(),
            config.realtime.sticky_pause_keeps_presence,
        );
        let groups = GroupService::new(
            services.directory.clone(),
            services.hasher.clone(),
            config.groups.clone(),
        );
        let pairs = PairService::new(services.directory.clone());

        let server_info = ServerInfo {
            shard_name: config.realtime.shard_name.clone(),
            max_groups_created: config.groups.max_groups_created,
            max_groups_joined: config.groups.max_groups_joined,
            max_group_members: config.groups.max_group_members,
            file_server_address: config.server.public_url.clone(),
            invocation_limit: config.realtime.max_parallel_invocations,
        };

        info!(
            shard = %config.realtime.shard_name,
            bus = services.bus.provider_type(),
            store = services.store.provider_type(),
            "Realtime engine initialized"
        );

        Self {
            connections: Arc::new(ConnectionPool::new()),
            registry: Arc::new(registry),
            resolver: Arc::new(resolver),
            groups: Arc::new(groups),
            pairs: Arc::new(pairs),
            bus: services.bus,
            directory: services.directory,
            uploads: services.uploads,
            config: Arc::new(config.realtime.clone()),
            server_info: Arc::new(server_info),
            counters: Arc::new(DashMap::new()),
            online_users: Arc::new(AtomicU64::new(0)),
            sweep_interval: Duration::from_secs(config.presence.sweep_interval_seconds.max(1)),
        }
    }

    pub fn shard_name(&self) -> &str {
        &self.config.shard_name
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Accept an authenticated connection for `user`.
    ///
    /// The newest connection of an identity wins: an older local one is
    /// closed, an older one on another shard is told to close through the
    /// bus. Visible peers are told the user came online unless a previous
    /// session was still live.
    pub async fn connect(
        &self,
        user: UserData,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(
            user,
            &self.config.shard_name,
            tx,
            self.config.max_parallel_invocations,
        ));
        let uid = handle.uid().clone();

        let previous_session = self.registry.lookup(&uid).await;
        let previous_local = self.connections.insert(handle.clone());

        if let Some(previous) = &previous_local {
            previous.mark_superseded();
            previous.send(OutboundMessage::warning(
                "Your identity connected from another client; this connection is closed",
            ));
            previous.close();
            info!(%uid, old = %previous.id, new = %handle.id, "Local connection superseded");
        }
        if let Some(session) = &previous_session {
            if session.shard != self.config.shard_name {
                let envelope = ShardEnvelope::close(
                    uid.clone(),
                    session.connection_id,
                    OutboundMessage::warning(
                        "Your identity connected from another client; this connection is closed",
                    ),
                );
                if let Err(e) = self.bus.publish(&session.shard, envelope).await {
                    warn!(%uid, shard = %session.shard, error = %e, "Failed to close remote session");
                }
            }
        }

        if let Err(e) = self.registry.register(&handle.session).await {
            warn!(%uid, error = %e, "Presence registration failed, continuing without it");
        }
        self.repair_registration(&handle).await;

        let alias = handle.user.alias.as_deref();
        if let Err(e) = self.directory.record_login(&uid, alias, Utc::now()).await {
            warn!(%uid, error = %e, "Failed to record login");
        }

        let peers = self.online_visible_peers(&uid).await;
        let was_online = previous_session.is_some() || previous_local.is_some();
        if !was_online {
            for (peer, session) in &peers {
                if let Some(view) = self.peer_view_of(&peer.user.uid, &uid).await {
                    self.deliver_to_session(session, OutboundMessage::UserOnline { peer: view })
                        .await;
                }
            }
        }

        let online = self.refresh_online_count().await;
        handle.send(OutboundMessage::SystemInfo {
            online_users: online,
        });
        handle.send(OutboundMessage::info(format!(
            "Welcome to TeraSync shard \"{}\". Current online users: {}",
            self.config.shard_name, online
        )));
        for (peer, _) in peers {
            handle.send(OutboundMessage::UserOnline { peer });
        }

        self.counters.insert(uid.clone(), SessionCounters::default());
        info!(%uid, conn = %handle.id, shard = %self.config.shard_name, "Hub connection established");
        (handle, rx)
    }

    /// Tear down a connection. Safe to call more than once.
    ///
    /// Returns `true` when this call ended the identity's session, `false`
    /// when a newer connection had taken over or the connection was already
    /// torn down. [`ConnectionHandle::session_ended`] keeps the outcome for
    /// later callers.
    pub async fn disconnect(&self, handle: &Arc<ConnectionHandle>) -> bool {
        let uid = handle.uid().clone();
        handle.invocations.shutdown();
        handle.close();

        if handle.is_superseded() {
            self.connections.remove_if_current(&uid, handle.id);
            debug!(%uid, conn = %handle.id, "Superseded connection closed");
            return false;
        }
        if !self.connections.remove_if_current(&uid, handle.id) {
            return false;
        }

        let mut ended = false;
        let mut stale = None;
        let taken_over = match self.registry.lookup(&uid).await {
            Some(session) if session.connection_id != handle.id => {
                let live = session.shard != self.config.shard_name
                    || self.connections.get(&uid).is_some();
                if !live {
                    // Left behind by a local connection that was superseded
                    // while it was still registering.
                    stale = Some(session);
                }
                live
            }
            _ => false,
        };
        if taken_over {
            debug!(%uid, conn = %handle.id, "Session owned by a newer connection, skipping offline");
        } else {
            if let Some(session) = &stale {
                if let Err(e) = self.registry.unregister(session).await {
                    warn!(%uid, error = %e, "Failed to remove stale presence row");
                }
            }
            ended = true;
            handle.mark_session_ended();
            for (peer, session) in self.online_visible_peers(&uid).await {
                debug!(%uid, peer = %peer.user.uid, "Sending offline notice");
                self.deliver_to_session(
                    &session,
                    OutboundMessage::UserOffline {
                        user: handle.user.clone(),
                    },
                )
                .await;
            }
            if let Err(e) = self.registry.unregister(&handle.session).await {
                warn!(%uid, error = %e, "Failed to remove presence row");
            }
            match self.uploads.discard_unfinished(&uid).await {
                Ok(0) => {}
                Ok(n) => info!(%uid, discarded = n, "Discarded unfinished uploads"),
                Err(e) => warn!(%uid, error = %e, "Failed to discard unfinished uploads"),
            }
        }

        self.counters.remove(&uid);
        info!(%uid, conn = %handle.id, "Hub connection closed");
        ended
    }

    /// Make the registry agree with the connection pool after `handle`
    /// registered. A concurrent connect for the same uid can supersede
    /// `handle` between its pool insert and its registry write, leaving the
    /// older row in place of the newer one.
    async fn repair_registration(&self, handle: &Arc<ConnectionHandle>) {
        let current = self.connections.get(handle.uid());
        if current.as_ref().is_some_and(|c| c.id == handle.id) {
            return;
        }
        let uid = handle.uid();
        if let Err(e) = self.registry.unregister(&handle.session).await {
            warn!(%uid, error = %e, "Failed to remove superseded presence row");
        }
        if let Some(current) = current {
            debug!(%uid, stale = %handle.id, current = %current.id, "Restoring newer registration");
            if let Err(e) = self.registry.register(&current.session).await {
                warn!(%uid, error = %e, "Presence registration failed, continuing without it");
            }
        }
    }

    /// Close every local connection.
    pub async fn shutdown(&self) {
        info!("Shutting down realtime engine");
        for handle in self.connections.all() {
            handle.send(OutboundMessage::warning("Server is shutting down"));
            self.disconnect(&handle).await;
        }
        info!("Realtime engine shut down");
    }

    // ── Delivery ────────────────────────────────────────────────────

    /// Deliver to a local connection only.
    pub fn deliver_local(&self, uid: &Uid, message: OutboundMessage) -> bool {
        match self.connections.get(uid) {
            Some(handle) => handle.send(message),
            None => false,
        }
    }

    /// Deliver to wherever `uid` is connected. Offline uids are skipped.
    ///
    /// Returns whether the message was queued on a local connection or
    /// handed to the bus for another shard.
    pub async fn deliver(&self, uid: &Uid, message: OutboundMessage) -> bool {
        if self.deliver_local(uid, message.clone()) {
            return true;
        }
        match self.registry.lookup(uid).await {
            Some(session) if session.shard != self.config.shard_name => {
                self.publish(&session, message).await
            }
            _ => {
                debug!(%uid, "Recipient offline, message dropped");
                false
            }
        }
    }

    /// Deliver to the connection recorded in `session`.
    pub(crate) async fn deliver_to_session(&self, session: &Session, message: OutboundMessage) {
        if session.shard == self.config.shard_name {
            self.deliver_local(&session.uid, message);
        } else {
            self.publish(session, message).await;
        }
    }

    async fn publish(&self, session: &Session, message: OutboundMessage) -> bool {
        let envelope = ShardEnvelope::deliver(session.uid.clone(), message);
        match self.bus.publish(&session.shard, envelope).await {
            Ok(()) => true,
            Err(e) => {
                warn!(uid = %session.uid, shard = %session.shard, error = %e, "Cross-shard delivery failed");
                false
            }
        }
    }

    /// Handle an envelope received on this shard's bus channel.
    pub async fn receive_envelope(&self, envelope: ShardEnvelope) {
        match envelope.close {
            Some(connection) => {
                if let Some(handle) = self.connections.get(&envelope.target) {
                    if handle.id == connection {
                        handle.send(envelope.message);
                        handle.mark_superseded();
                        self.disconnect(&handle).await;
                        info!(uid = %envelope.target, conn = %connection, "Connection superseded by another shard");
                    }
                }
            }
            None => {
                self.deliver_local(&envelope.target, envelope.message);
            }
        }
    }

    /// Tell the owner of `request_id` that it may be pulled now.
    pub async fn send_download_ready(&self, uid: &Uid, request_id: RequestId) {
        debug!(%uid, %request_id, "Announcing download ready");
        self.deliver(uid, OutboundMessage::DownloadReady { request_id })
            .await;
    }

    // ── Presence views ──────────────────────────────────────────────

    /// Visible peers of `uid` that currently hold a session.
    pub async fn online_visible_peers(&self, uid: &Uid) -> Vec<(VisiblePeer, Session)> {
        let peers = match self.resolver.visible_peers(uid).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(%uid, error = %e, "Failed to resolve visible peers");
                return Vec::new();
            }
        };
        let uids: Vec<Uid> = peers.iter().map(|p| p.user.uid.clone()).collect();
        let mut sessions = self.registry.lookup_many(&uids).await;
        peers
            .into_iter()
            .filter_map(|peer| {
                sessions
                    .remove(&peer.user.uid)
                    .map(|session| (peer, session))
            })
            .collect()
    }

    /// How `viewer` sees `subject`, if at all.
    async fn peer_view_of(&self, viewer: &Uid, subject: &Uid) -> Option<VisiblePeer> {
        match self.resolver.visible_peers(viewer).await {
            Ok(peers) => peers.into_iter().find(|p| &p.user.uid == subject),
            Err(e) => {
                warn!(uid = %viewer, error = %e, "Failed to resolve visible peers");
                None
            }
        }
    }

    /// Visible-peer maps of `users`, taken before a mutation.
    pub(crate) async fn peer_snapshot(
        &self,
        users: &[Uid],
    ) -> HashMap<Uid, HashMap<Uid, VisiblePeer>> {
        let mut snapshot = HashMap::new();
        for uid in users {
            snapshot.insert(uid.clone(), self.peer_map(uid).await);
        }
        snapshot
    }

    async fn peer_map(&self, uid: &Uid) -> HashMap<Uid, VisiblePeer> {
        match self.resolver.visible_peers(uid).await {
            Ok(peers) => peers
                .into_iter()
                .map(|peer| (peer.user.uid.clone(), peer))
                .collect(),
            Err(e) => {
                warn!(%uid, error = %e, "Failed to resolve visible peers");
                HashMap::new()
            }
        }
    }

    /// Recompute the peers of every user in `before` and push the
    /// differences to online users: newly visible or changed peers arrive
    /// as `user_online`, peers no longer visible as `user_offline`.
    pub(crate) async fn publish_peer_changes(
        &self,
        before: HashMap<Uid, HashMap<Uid, VisiblePeer>>,
    ) {
        let users: Vec<Uid> = before.keys().cloned().collect();
        let mut involved: HashSet<Uid> = users.iter().cloned().collect();
        let mut changes = Vec::new();

        for (uid, old) in before {
            let new = self.peer_map(&uid).await;
            let mut appeared = Vec::new();
            for (peer_uid, peer) in &new {
                if old.get(peer_uid) != Some(peer) {
                    involved.insert(peer_uid.clone());
                    appeared.push(peer.clone());
                }
            }
            let mut vanished = Vec::new();
            for (peer_uid, peer) in &old {
                if !new.contains_key(peer_uid) {
                    involved.insert(peer_uid.clone());
                    vanished.push(peer.user.clone());
                }
            }
            if !appeared.is_empty() || !vanished.is_empty() {
                changes.push((uid, appeared, vanished));
            }
        }
        if changes.is_empty() {
            return;
        }

        let involved: Vec<Uid> = involved.into_iter().collect();
        let sessions = self.registry.lookup_many(&involved).await;
        for (uid, appeared, vanished) in changes {
            let Some(session) = sessions.get(&uid) else {
                continue;
            };
            for peer in appeared {
                if sessions.contains_key(&peer.user.uid) {
                    self.deliver_to_session(session, OutboundMessage::UserOnline { peer })
                        .await;
                }
            }
            for user in vanished {
                if sessions.contains_key(&user.uid) {
                    self.deliver_to_session(session, OutboundMessage::UserOffline { user })
                        .await;
                }
            }
        }
    }

    // ── Info and counters ───────────────────────────────────────────

    /// Reply body of `get_connection_info`.
    pub fn connection_info(&self, handle: &ConnectionHandle) -> ConnectionInfo {
        ConnectionInfo {
            user: handle.user.clone(),
            server_info: (*self.server_info).clone(),
            default_permissions: self.config.default_permissions.clone(),
        }
    }

    /// Recount live sessions. Falls back to the last known count when the
    /// store is unavailable.
    pub async fn refresh_online_count(&self) -> u64 {
        match self.registry.online_count().await {
            Ok(count) => {
                self.online_users.store(count, Ordering::Relaxed);
                count
            }
            Err(e) => {
                warn!(error = %e, "Failed to count online users");
                self.online_users.load(Ordering::Relaxed)
            }
        }
    }

    /// Last computed online count.
    pub fn online_count(&self) -> u64 {
        self.online_users.load(Ordering::Relaxed)
    }

    /// Push the current system info to every local connection.
    pub fn broadcast_system_info(&self) {
        let online_users = self.online_count();
        for handle in self.connections.all() {
            handle.send(OutboundMessage::SystemInfo { online_users });
        }
    }

    pub fn session_counters(&self, uid: &Uid) -> Option<SessionCounters> {
        self.counters.get(uid).map(|entry| *entry.value())
    }

    pub(crate) fn record_call(&self, uid: &Uid, ok: bool, relayed: u64) {
        if let Some(mut counters) = self.counters.get_mut(uid) {
            counters.calls += 1;
            if !ok {
                counters.failed_calls += 1;
            }
            counters.payloads_relayed += relayed;
        }
    }
}
