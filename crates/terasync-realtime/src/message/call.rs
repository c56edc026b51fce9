//! Client to server calls.
//!
//! A call is one JSON text frame:
//! `{"id": 1, "method": "group_join", "params": {...}}`. The reply is an
//! [`OutboundMessage::Response`](super::OutboundMessage::Response) carrying
//! the same id.

use serde::{Deserialize, Serialize};
use validator::Validate;

use terasync_core::types::{GroupId, Uid};
use terasync_entity::{
    GroupMemberRole, GroupPermissions, GroupUserPreferredPermissions, UserPermissions,
};
use terasync_service::group::{
    BanUserRequest, ChangePasswordRequest, CreateGroupRequest, CreateTempInvitesRequest,
    JoinGroupRequest, PruneGroupRequest,
};

/// One framed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    /// Correlates the response.
    pub id: u64,
    #[serde(flatten)]
    pub call: HubCall,
}

/// Every call a client can make.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum HubCall {
    GetConnectionInfo,
    Heartbeat,
    /// Currently online visible peers.
    GetOnlinePeers,
    SendPayload(RelayParams),

    PairAdd(UidParams),
    PairRemove(UidParams),
    PairSetPermissions(PairPermissionParams),
    PairList,

    GroupCreate(CreateGroupRequest),
    GroupJoin(JoinGroupRequest),
    GroupLeave(GidParams),
    GroupBan(BanUserRequest),
    GroupUnban(MemberParams),
    GroupRemoveUser(MemberParams),
    GroupSetPermissions(GroupPermissionParams),
    GroupSetUserInfo(UserInfoParams),
    GroupSetPreferredPermissions(PreferredPermissionParams),
    GroupPrune(PruneGroupRequest),
    GroupListBanned(GidParams),
    GroupCreateTempInvite(CreateTempInvitesRequest),
    GroupChangeOwnership(MemberParams),
    GroupChangePassword(ChangePasswordRequest),
    GroupDelete(GidParams),
    GroupList,
}

impl HubCall {
    /// Method name as sent on the wire, for logs.
    pub fn method(&self) -> &'static str {
        match self {
            Self::GetConnectionInfo => "get_connection_info",
            Self::Heartbeat => "heartbeat",
            Self::GetOnlinePeers => "get_online_peers",
            Self::SendPayload(_) => "send_payload",
            Self::PairAdd(_) => "pair_add",
            Self::PairRemove(_) => "pair_remove",
            Self::PairSetPermissions(_) => "pair_set_permissions",
            Self::PairList => "pair_list",
            Self::GroupCreate(_) => "group_create",
            Self::GroupJoin(_) => "group_join",
            Self::GroupLeave(_) => "group_leave",
            Self::GroupBan(_) => "group_ban",
            Self::GroupUnban(_) => "group_unban",
            Self::GroupRemoveUser(_) => "group_remove_user",
            Self::GroupSetPermissions(_) => "group_set_permissions",
            Self::GroupSetUserInfo(_) => "group_set_user_info",
            Self::GroupSetPreferredPermissions(_) => "group_set_preferred_permissions",
            Self::GroupPrune(_) => "group_prune",
            Self::GroupListBanned(_) => "group_list_banned",
            Self::GroupCreateTempInvite(_) => "group_create_temp_invite",
            Self::GroupChangeOwnership(_) => "group_change_ownership",
            Self::GroupChangePassword(_) => "group_change_password",
            Self::GroupDelete(_) => "group_delete",
            Self::GroupList => "group_list",
        }
    }
}

/// Relay a payload to an explicit recipient list.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RelayParams {
    #[validate(length(min = 1, max = 1000))]
    pub recipients: Vec<Uid>,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UidParams {
    pub uid: Uid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GidParams {
    pub gid: GroupId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberParams {
    pub gid: GroupId,
    pub uid: Uid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairPermissionParams {
    pub uid: Uid,
    pub permissions: UserPermissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupPermissionParams {
    pub gid: GroupId,
    pub permissions: GroupPermissions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfoParams {
    pub gid: GroupId,
    pub uid: Uid,
    pub role: GroupMemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferredPermissionParams {
    pub gid: GroupId,
    pub permissions: GroupUserPreferredPermissions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unit_and_param_calls() {
        let heartbeat: ClientRequest =
            serde_json::from_str(r#"{"id":3,"method":"heartbeat"}"#).unwrap();
        assert_eq!(heartbeat.id, 3);
        assert!(matches!(heartbeat.call, HubCall::Heartbeat));

        let join: ClientRequest = serde_json::from_str(
            r#"{"id":4,"method":"group_join","params":{"group":"TSV-ABC","password":"pw"}}"#,
        )
        .unwrap();
        match join.call {
            HubCall::GroupJoin(request) => assert_eq!(request.group, "TSV-ABC"),
            other => panic!("unexpected call {}", other.method()),
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        assert!(serde_json::from_str::<ClientRequest>(r#"{"id":1,"method":"nope"}"#).is_err());
    }

    #[test]
    fn test_relay_requires_recipients() {
        let params = RelayParams {
            recipients: Vec::new(),
            payload: serde_json::json!({}),
        };
        assert!(params.validate().is_err());
    }
}
