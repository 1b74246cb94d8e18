//! # Typed Command Shapes
//!
//! Parameter and result types for the dynamic-security administration
//! commands. These are pure data: each facade method serializes one of these
//! into the command's parameter object and deserializes the response `data`
//! payload back out. Optional fields are skipped on the wire when unset so
//! the broker never sees explicit nulls.

use serde::{Deserialize, Serialize};

/// Pagination parameters shared by the list commands
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

/// Result of `listClients`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListClientsResponse {
    pub total_count: i64,
    pub clients: Vec<String>,
}

/// Result of `listRoles`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListRolesResponse {
    pub total_count: i64,
    pub roles: Vec<String>,
}

/// Result of `listGroups`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ListGroupsResponse {
    pub total_count: i64,
    pub groups: Vec<String>,
}

/// Parameters for `createClient`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateClientParams {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clientid: Option<String>,
}

impl CreateClientParams {
    /// Client with username only; password and client id left to the broker
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            clientid: None,
        }
    }
}

/// Reference to a role attached to a client or group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleRef {
    pub rolename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Reference to a client attached to a group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientRef {
    pub username: String,
}

/// Reference to a group attached to a client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupRef {
    pub groupname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Result of `getClient`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientDetails {
    pub username: String,
    #[serde(default)]
    pub clientid: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    #[serde(default)]
    pub groups: Vec<GroupRef>,
}

/// Access control entry types attachable to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AclType {
    PublishClientSend,
    PublishClientReceive,
    SubscribeLiteral,
    SubscribePattern,
    UnsubscribeLiteral,
    UnsubscribePattern,
}

/// One access control entry on a role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleAcl {
    pub acltype: AclType,
    pub topic: String,
    #[serde(default)]
    pub allow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Result of `getRole`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleDetails {
    pub rolename: String,
    #[serde(default)]
    pub acls: Vec<RoleAcl>,
}

/// Result of `getGroup` and `getAnonymousGroup`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupDetails {
    pub groupname: String,
    #[serde(default)]
    pub clients: Vec<ClientRef>,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

/// Parameters for `addRoleACL`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddRoleAclParams {
    pub rolename: String,
    pub acltype: AclType,
    pub topic: String,
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}

/// Parameters for `removeRoleACL`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveRoleAclParams {
    pub rolename: String,
    pub acltype: AclType,
    pub topic: String,
}

/// Access classes covered by the default ACL policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefaultAclType {
    PublishClientSend,
    PublishClientReceive,
    Subscribe,
    Unsubscribe,
}

/// One entry of the broker-wide default ACL policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefaultAclEntry {
    pub acltype: DefaultAclType,
    pub allow: bool,
}
