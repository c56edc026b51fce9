//! Individual hub connection handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use terasync_core::types::{ConnectionId, Uid};
use terasync_entity::UserData;

use super::guard::InvocationGuard;
use crate::message::OutboundMessage;
use crate::presence::registry::Session;

/// A handle to a single hub connection.
///
/// Holds the sender for pushing messages to the client, the session it
/// registered, and a close signal the socket task listens on.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection id
    pub id: ConnectionId,
    /// Identity of the caller
    pub user: UserData,
    /// Session recorded in the presence registry
    pub session: Session,
    /// Sender for outbound messages
    sender: mpsc::Sender<OutboundMessage>,
    /// Bounds concurrent calls
    pub invocations: InvocationGuard,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    /// Last message received from the client
    last_activity: RwLock<Instant>,
    /// Set when a newer connection for the same uid took over
    superseded: AtomicBool,
    /// Set when the identity's session ended with this connection
    session_ended: AtomicBool,
    /// Cancelled when the server wants the socket closed
    closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(
        user: UserData,
        shard: &str,
        sender: mpsc::Sender<OutboundMessage>,
        max_parallel_invocations: usize,
    ) -> Self {
        let id = ConnectionId::new();
        Self {
            id,
            session: Session::new(user.uid.clone(), id, shard),
            user,
            sender,
            invocations: InvocationGuard::new(max_parallel_invocations),
            connected_at: Utc::now(),
            last_activity: RwLock::new(Instant::now()),
            superseded: AtomicBool::new(false),
            session_ended: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.user.uid
    }

    /// Queue a message for the client. Returns `false` when it was dropped.
    pub fn send(&self, msg: OutboundMessage) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(conn = %self.id, uid = %self.user.uid, "Send buffer full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn = %self.id, "Send on closed connection");
                self.close();
                false
            }
        }
    }

    /// Record client activity.
    pub async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    /// Time since the client last sent anything.
    pub async fn idle_for(&self) -> std::time::Duration {
        self.last_activity.read().await.elapsed()
    }

    /// Ask the socket task to close the connection.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`Self::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    pub fn mark_superseded(&self) {
        self.superseded.store(true, Ordering::SeqCst);
    }

    pub fn is_superseded(&self) -> bool {
        self.superseded.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_session_ended(&self) {
        self.session_ended.store(true, Ordering::SeqCst);
    }

    /// Whether the identity went offline when this connection was torn
    /// down, whoever did the tearing down.
    pub fn session_ended(&self) -> bool {
        self.session_ended.load(Ordering::SeqCst)
    }
}
