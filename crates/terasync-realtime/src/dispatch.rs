//! Client call routing.
//!
//! A text frame gets its own task only after the connection's invocation
//! guard hands out a permit; the reader waits for that permit, so a client
//! never has more calls outstanding than its limit. Calls that change the social graph take a
//! visible-peer snapshot of everyone affected first and publish the
//! difference afterwards.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, warn};
use validator::Validate;

use terasync_core::error::AppError;
use terasync_core::result::AppResult;
use terasync_core::types::{GroupId, Uid};

use crate::connection::handle::ConnectionHandle;
use crate::message::{ClientRequest, HubCall, OutboundMessage};
use crate::message::call::RelayParams;
use crate::server::RealtimeEngine;

impl RealtimeEngine {
    /// Wait for a free invocation slot, then run one client frame in the
    /// background. The frame is dropped when the connection is closing.
    pub async fn admit_call(&self, handle: &Arc<ConnectionHandle>, text: String) {
        let Some(permit) = handle.invocations.acquire().await else {
            debug!(conn = %handle.id, "Connection closing, call dropped");
            return;
        };
        let engine = self.clone();
        let handle = Arc::clone(handle);
        tokio::spawn(async move {
            let _permit = permit;
            if let Some(reply) = engine.handle_frame(&handle, &text).await {
                handle.send(reply);
            }
        });
    }

    /// Parse and execute one frame. Returns the reply, if any.
    pub async fn handle_frame(
        &self,
        handle: &Arc<ConnectionHandle>,
        text: &str,
    ) -> Option<OutboundMessage> {
        handle.touch().await;

        let raw: Value = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(conn = %handle.id, error = %e, "Unparseable frame");
                return Some(OutboundMessage::error("Malformed message"));
            }
        };
        let id = raw.get("id").and_then(Value::as_u64);
        let request: ClientRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                let err = AppError::validation(format!("Invalid call: {e}"));
                return Some(match id {
                    Some(id) => OutboundMessage::failed(id, &err),
                    None => OutboundMessage::error(err.public_message()),
                });
            }
        };

        let method = request.call.method();
        let result = self.execute(handle, request.call).await;
        let relayed = match &result {
            Ok(value) => value.get("delivered").and_then(Value::as_u64).unwrap_or(0),
            Err(_) => 0,
        };
        self.record_call(handle.uid(), result.is_ok(), relayed);

        Some(match result {
            Ok(value) => OutboundMessage::ok(request.id, value),
            Err(err) => {
                if !err.kind.is_client_facing() {
                    warn!(uid = %handle.uid(), method, error = %err, "Call failed");
                } else {
                    debug!(uid = %handle.uid(), method, error = %err, "Call rejected");
                }
                OutboundMessage::failed(request.id, &err)
            }
        })
    }

    async fn execute(&self, handle: &Arc<ConnectionHandle>, call: HubCall) -> AppResult<Value> {
        let actor = handle.uid().clone();
        match call {
            HubCall::GetConnectionInfo => to_json(self.connection_info(handle)),
            HubCall::Heartbeat => {
                let live = self.registry.heartbeat(&handle.session).await;
                Ok(json!({ "registered": live }))
            }
            HubCall::GetOnlinePeers => {
                let peers: Vec<_> = self
                    .online_visible_peers(&actor)
                    .await
                    .into_iter()
                    .map(|(peer, _)| peer)
                    .collect();
                to_json(peers)
            }
            HubCall::SendPayload(params) => self.relay(handle, params).await,

            HubCall::PairAdd(params) => {
                let users = [actor.clone(), params.uid.clone()];
                self.with_peer_diff(&users, self.pairs.add(&actor, &params.uid))
                    .await
            }
            HubCall::PairRemove(params) => {
                let users = [actor.clone(), params.uid.clone()];
                self.with_peer_diff(&users, self.pairs.remove(&actor, &params.uid))
                    .await
            }
            HubCall::PairSetPermissions(params) => {
                let users = [actor.clone(), params.uid.clone()];
                self.with_peer_diff(
                    &users,
                    self.pairs
                        .set_permissions(&actor, &params.uid, params.permissions),
                )
                .await
            }
            HubCall::PairList => to_json(self.pairs.list(&actor).await?),

            HubCall::GroupCreate(request) => to_json(self.groups.create(&actor, request).await?),
            HubCall::GroupJoin(request) => {
                let users = match self.directory.find_group(&request.group).await? {
                    Some(group) => self.group_audience(&actor, &group.gid).await,
                    None => vec![actor.clone()],
                };
                self.with_peer_diff(&users, self.groups.join(&actor, request))
                    .await
            }
            HubCall::GroupLeave(params) => {
                let users = self.group_audience(&actor, &params.gid).await;
                self.with_peer_diff(&users, self.groups.leave(&actor, &params.gid))
                    .await
            }
            HubCall::GroupBan(request) => {
                let users = self.group_audience(&actor, &request.gid).await;
                self.with_peer_diff(&users, self.groups.ban(&actor, request))
                    .await
            }
            HubCall::GroupUnban(params) => {
                to_json(self.groups.unban(&actor, &params.gid, &params.uid).await?)
            }
            HubCall::GroupRemoveUser(params) => {
                let users = self.group_audience(&actor, &params.gid).await;
                self.with_peer_diff(
                    &users,
                    self.groups.remove_user(&actor, &params.gid, &params.uid),
                )
                .await
            }
            HubCall::GroupSetPermissions(params) => {
                let users = self.group_audience(&actor, &params.gid).await;
                self.with_peer_diff(
                    &users,
                    self.groups
                        .set_permissions(&actor, &params.gid, params.permissions),
                )
                .await
            }
            HubCall::GroupSetUserInfo(params) => to_json(
                self.groups
                    .set_user_info(&actor, &params.gid, &params.uid, params.role)
                    .await?,
            ),
            HubCall::GroupSetPreferredPermissions(params) => {
                let users = self.group_audience(&actor, &params.gid).await;
                self.with_peer_diff(
                    &users,
                    self.groups
                        .set_preferred_permissions(&actor, &params.gid, params.permissions),
                )
                .await
            }
            HubCall::GroupPrune(request) => {
                let users = if request.execute {
                    self.group_audience(&actor, &request.gid).await
                } else {
                    Vec::new()
                };
                self.with_peer_diff(&users, self.groups.prune(&actor, request))
                    .await
            }
            HubCall::GroupListBanned(params) => {
                to_json(self.groups.list_banned(&actor, &params.gid).await?)
            }
            HubCall::GroupCreateTempInvite(request) => {
                to_json(self.groups.create_temp_invites(&actor, request).await?)
            }
            HubCall::GroupChangeOwnership(params) => to_json(
                self.groups
                    .change_ownership(&actor, &params.gid, &params.uid)
                    .await?,
            ),
            HubCall::GroupChangePassword(request) => {
                to_json(self.groups.change_password(&actor, request).await?)
            }
            HubCall::GroupDelete(params) => {
                let users = self.group_audience(&actor, &params.gid).await;
                self.with_peer_diff(&users, self.groups.delete(&actor, &params.gid))
                    .await
            }
            HubCall::GroupList => to_json(self.groups.list(&actor).await?),
        }
    }

    /// Relay a payload to the recipients the sender can currently see and
    /// has not paused.
    async fn relay(&self, handle: &Arc<ConnectionHandle>, params: RelayParams) -> AppResult<Value> {
        params
            .validate()
            .map_err(|e| AppError::validation(format!("Invalid payload: {e}")))?;

        let allowed: HashSet<Uid> = self
            .resolver
            .visible_peers(handle.uid())
            .await?
            .into_iter()
            .filter(|peer| !peer.permissions.paused)
            .map(|peer| peer.user.uid)
            .collect();

        let mut seen = HashSet::new();
        let mut delivered = 0u64;
        for recipient in params.recipients {
            if !allowed.contains(&recipient) || !seen.insert(recipient.clone()) {
                continue;
            }
            let message = OutboundMessage::Payload {
                from: handle.user.clone(),
                payload: params.payload.clone(),
            };
            if self.deliver(&recipient, message).await {
                delivered += 1;
            }
        }
        debug!(uid = %handle.uid(), delivered, "Payload relayed");
        Ok(json!({ "delivered": delivered }))
    }

    /// Run `mutation` between a peer snapshot of `users` and the diff push.
    async fn with_peer_diff<T, F>(&self, users: &[Uid], mutation: F) -> AppResult<Value>
    where
        T: Serialize,
        F: Future<Output = AppResult<T>>,
    {
        let before = self.peer_snapshot(users).await;
        let result = mutation.await?;
        self.publish_peer_changes(before).await;
        to_json(result)
    }

    /// The actor plus every current member of `gid`.
    async fn group_audience(&self, actor: &Uid, gid: &GroupId) -> Vec<Uid> {
        let mut users = vec![actor.clone()];
        match self.groups.member_uids(gid).await {
            Ok(members) => users.extend(members.into_iter().filter(|uid| uid != actor)),
            Err(e) => debug!(%gid, error = %e, "Could not list group members"),
        }
        users
    }
}

fn to_json<T: Serialize>(value: T) -> AppResult<Value> {
    Ok(serde_json::to_value(value)?)
}
