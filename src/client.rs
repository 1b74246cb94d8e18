//! # Dynamic Security Client
//!
//! Connection lifecycle plus the typed command facade. `DynsecClient` owns the
//! transport, the correlation engine, and the dispatcher task that feeds
//! inbound response payloads to the engine. Every facade method is parameter
//! shaping and result projection over [`CorrelationEngine::issue_command`];
//! no additional state lives here.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mosquitto_dynsec::{DynsecClient, DynsecConfig};
//! use mosquitto_dynsec::commands::CreateClientParams;
//!
//! # async fn run() -> mosquitto_dynsec::DynsecResult<()> {
//! let mut client = DynsecClient::new(
//!     DynsecConfig::new().with_credentials("admin-user", "secret"),
//! );
//! client.connect().await?;
//!
//! client.create_client(CreateClientParams::named("sensor-1")).await?;
//! let details = client.get_client("sensor-1").await?;
//! println!("roles: {:?}", details.roles);
//!
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::{
    AddRoleAclParams, ClientDetails, CreateClientParams, DefaultAclEntry, GroupDetails,
    ListClientsResponse, ListGroupsResponse, ListParams, ListRolesResponse, RemoveRoleAclParams,
    RoleDetails,
};
use crate::config::DynsecConfig;
use crate::correlation::{CorrelationEngine, DispatchStats};
use crate::error::{DynsecError, DynsecResult};
use crate::transport::{MqttTransport, Transport, TransportMessage};

/// Client for the Mosquitto dynamic-security control API
pub struct DynsecClient {
    config: DynsecConfig,
    engine: Option<CorrelationEngine>,
    dispatcher: Option<JoinHandle<()>>,
}

impl DynsecClient {
    /// Create an unconnected client
    pub fn new(config: DynsecConfig) -> Self {
        Self {
            config,
            engine: None,
            dispatcher: None,
        }
    }

    /// The configuration this client was built with
    pub fn config(&self) -> &DynsecConfig {
        &self.config
    }

    /// Whether a transport is currently attached
    pub fn is_connected(&self) -> bool {
        self.engine.is_some()
    }

    /// Connect to the broker and subscribe the response topic
    ///
    /// Single-shot: connecting while already connected is a caller error.
    #[instrument(skip(self), fields(host = %self.config.host, port = self.config.port))]
    pub async fn connect(&mut self) -> DynsecResult<()> {
        if self.engine.is_some() {
            return Err(DynsecError::configuration("already connected"));
        }
        self.config.validate()?;

        let (transport, messages) = MqttTransport::connect(&self.config).await?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        transport.subscribe(&self.config.response_topic()).await?;

        self.install(transport, messages);
        info!(
            response_topic = %self.config.response_topic(),
            "Dynamic-security client connected"
        );
        Ok(())
    }

    /// Attach an already-connected transport instead of dialing the broker
    ///
    /// The transport must already be subscribed to the response topic and
    /// deliver its messages through `messages`. This is the seam for custom
    /// transports and in-memory testing.
    pub fn attach_transport(
        &mut self,
        transport: Arc<dyn Transport>,
        messages: mpsc::Receiver<TransportMessage>,
    ) {
        self.install(transport, messages);
    }

    /// Disconnect from the broker
    ///
    /// Every pending command is settled with [`DynsecError::Disconnected`]
    /// before the transport closes, so no caller is left waiting forever.
    /// Resolves immediately when not connected:
    ///
    /// ```rust
    /// use mosquitto_dynsec::{DynsecClient, DynsecConfig};
    ///
    /// # tokio_test::block_on(async {
    /// let mut client = DynsecClient::new(DynsecConfig::new());
    /// assert!(!client.is_connected());
    /// client.disconnect().await.unwrap();
    /// # });
    /// ```
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) -> DynsecResult<()> {
        let Some(engine) = self.engine.take() else {
            return Ok(());
        };

        let aborted = engine.abort_all_disconnected();
        if aborted > 0 {
            warn!(aborted, "Disconnecting with commands still pending");
        }

        engine.close().await?;
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }

        info!("Dynamic-security client disconnected");
        Ok(())
    }

    /// Dispatch activity counters, when connected
    pub fn stats(&self) -> Option<DispatchStats> {
        self.engine.as_ref().map(CorrelationEngine::stats)
    }

    /// Issue a raw command by name
    ///
    /// Escape hatch for commands the typed facade does not cover. Resolves
    /// with the response `data` payload, if any.
    pub async fn send_command(
        &self,
        command: &str,
        parameters: Map<String, Value>,
    ) -> DynsecResult<Option<Value>> {
        self.engine()?.issue_command(command, parameters).await
    }

    fn engine(&self) -> DynsecResult<&CorrelationEngine> {
        self.engine.as_ref().ok_or(DynsecError::NotConnected)
    }

    fn install(
        &mut self,
        transport: Arc<dyn Transport>,
        mut messages: mpsc::Receiver<TransportMessage>,
    ) {
        let engine = CorrelationEngine::new(
            transport,
            self.config.command_topic(),
            Duration::from_secs(self.config.timeout_seconds),
        );

        let dispatcher_engine = engine.clone();
        let response_topic = self.config.response_topic();
        let dispatcher = tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                if message.topic != response_topic {
                    debug!(topic = %message.topic, "Ignoring message on unrelated topic");
                    continue;
                }
                if let Err(e) = dispatcher_engine.dispatch(&message.payload) {
                    error!("Failed to dispatch response payload: {}", e);
                }
            }

            // Transport closed underneath us; settle whatever is left
            let aborted = dispatcher_engine.abort_all_disconnected();
            if aborted > 0 {
                warn!(aborted, "Transport closed with commands still pending");
            }
        });

        self.engine = Some(engine);
        self.dispatcher = Some(dispatcher);
    }

    /// Issue a void command, discarding any data payload
    async fn send_void(&self, command: &str, parameters: Map<String, Value>) -> DynsecResult<()> {
        self.send_command(command, parameters).await?;
        Ok(())
    }

    /// Issue a command whose response must carry a data payload
    async fn send_expecting<T: DeserializeOwned>(
        &self,
        command: &str,
        parameters: Map<String, Value>,
    ) -> DynsecResult<T> {
        let data = self
            .send_command(command, parameters)
            .await?
            .ok_or_else(|| DynsecError::missing_response_data(command))?;
        Ok(serde_json::from_value(data)?)
    }

    // Client administration

    /// Create a client account
    pub async fn create_client(&self, params: CreateClientParams) -> DynsecResult<()> {
        self.send_void("createClient", to_object(&params)?).await
    }

    /// Delete a client account
    pub async fn delete_client(&self, username: &str) -> DynsecResult<()> {
        self.send_void("deleteClient", to_object(&json!({"username": username}))?)
            .await
    }

    /// Fetch a client's details
    pub async fn get_client(&self, username: &str) -> DynsecResult<ClientDetails> {
        let data: ClientData = self
            .send_expecting("getClient", to_object(&json!({"username": username}))?)
            .await?;
        Ok(data.client)
    }

    /// List client usernames
    pub async fn list_clients(&self, params: ListParams) -> DynsecResult<ListClientsResponse> {
        self.send_expecting("listClients", to_object(&params)?).await
    }

    /// Restrict a client account to a fixed MQTT client id
    pub async fn set_client_id(&self, username: &str, clientid: &str) -> DynsecResult<()> {
        self.send_void(
            "setClientId",
            to_object(&json!({"username": username, "clientid": clientid}))?,
        )
        .await
    }

    /// Change a client account's password
    pub async fn set_client_password(&self, username: &str, password: &str) -> DynsecResult<()> {
        self.send_void(
            "setClientPassword",
            to_object(&json!({"username": username, "password": password}))?,
        )
        .await
    }

    /// Attach a role to a client, optionally at a priority
    pub async fn add_client_role(
        &self,
        username: &str,
        rolename: &str,
        priority: Option<i64>,
    ) -> DynsecResult<()> {
        let mut parameters = to_object(&json!({"username": username, "rolename": rolename}))?;
        if let Some(priority) = priority {
            parameters.insert("priority".to_string(), priority.into());
        }
        self.send_void("addClientRole", parameters).await
    }

    /// Detach a role from a client
    pub async fn remove_client_role(&self, username: &str, rolename: &str) -> DynsecResult<()> {
        self.send_void(
            "removeClientRole",
            to_object(&json!({"username": username, "rolename": rolename}))?,
        )
        .await
    }

    /// Enable a disabled client account
    pub async fn enable_client(&self, username: &str) -> DynsecResult<()> {
        self.send_void("enableClient", to_object(&json!({"username": username}))?)
            .await
    }

    /// Disable a client account without deleting it
    pub async fn disable_client(&self, username: &str) -> DynsecResult<()> {
        self.send_void("disableClient", to_object(&json!({"username": username}))?)
            .await
    }

    // Role administration

    /// Create a role
    pub async fn create_role(&self, rolename: &str) -> DynsecResult<()> {
        self.send_void("createRole", to_object(&json!({"rolename": rolename}))?)
            .await
    }

    /// Delete a role
    pub async fn delete_role(&self, rolename: &str) -> DynsecResult<()> {
        self.send_void("deleteRole", to_object(&json!({"rolename": rolename}))?)
            .await
    }

    /// Fetch a role and its ACL entries
    pub async fn get_role(&self, rolename: &str) -> DynsecResult<RoleDetails> {
        let data: RoleData = self
            .send_expecting("getRole", to_object(&json!({"rolename": rolename}))?)
            .await?;
        Ok(data.role)
    }

    /// List role names
    pub async fn list_roles(&self, params: ListParams) -> DynsecResult<ListRolesResponse> {
        self.send_expecting("listRoles", to_object(&params)?).await
    }

    /// Add an ACL entry to a role
    pub async fn add_role_acl(&self, params: AddRoleAclParams) -> DynsecResult<()> {
        self.send_void("addRoleACL", to_object(&params)?).await
    }

    /// Remove an ACL entry from a role
    pub async fn remove_role_acl(&self, params: RemoveRoleAclParams) -> DynsecResult<()> {
        self.send_void("removeRoleACL", to_object(&params)?).await
    }

    // Group administration

    /// Create a group
    pub async fn create_group(&self, groupname: &str) -> DynsecResult<()> {
        self.send_void("createGroup", to_object(&json!({"groupname": groupname}))?)
            .await
    }

    /// Delete a group
    pub async fn delete_group(&self, groupname: &str) -> DynsecResult<()> {
        self.send_void("deleteGroup", to_object(&json!({"groupname": groupname}))?)
            .await
    }

    /// Fetch a group with its member clients and roles
    pub async fn get_group(&self, groupname: &str) -> DynsecResult<GroupDetails> {
        let data: GroupData = self
            .send_expecting("getGroup", to_object(&json!({"groupname": groupname}))?)
            .await?;
        Ok(data.group)
    }

    /// List group names
    pub async fn list_groups(&self, params: ListParams) -> DynsecResult<ListGroupsResponse> {
        self.send_expecting("listGroups", to_object(&params)?).await
    }

    /// Fetch the group applied to anonymous connections
    pub async fn get_anonymous_group(&self) -> DynsecResult<GroupDetails> {
        let data: GroupData = self.send_expecting("getAnonymousGroup", Map::new()).await?;
        Ok(data.group)
    }

    /// Set the group applied to anonymous connections
    pub async fn set_anonymous_group(&self, groupname: &str) -> DynsecResult<()> {
        self.send_void(
            "setAnonymousGroup",
            to_object(&json!({"groupname": groupname}))?,
        )
        .await
    }

    /// Add a client to a group
    pub async fn add_group_client(&self, groupname: &str, username: &str) -> DynsecResult<()> {
        self.send_void(
            "addGroupClient",
            to_object(&json!({"groupname": groupname, "username": username}))?,
        )
        .await
    }

    /// Remove a client from a group
    pub async fn remove_group_client(&self, groupname: &str, username: &str) -> DynsecResult<()> {
        self.send_void(
            "removeGroupClient",
            to_object(&json!({"groupname": groupname, "username": username}))?,
        )
        .await
    }

    /// Attach a role to a group, optionally at a priority
    pub async fn add_group_role(
        &self,
        groupname: &str,
        rolename: &str,
        priority: Option<i64>,
    ) -> DynsecResult<()> {
        let mut parameters = to_object(&json!({"groupname": groupname, "rolename": rolename}))?;
        if let Some(priority) = priority {
            parameters.insert("priority".to_string(), priority.into());
        }
        self.send_void("addGroupRole", parameters).await
    }

    /// Detach a role from a group
    pub async fn remove_group_role(&self, groupname: &str, rolename: &str) -> DynsecResult<()> {
        self.send_void(
            "removeGroupRole",
            to_object(&json!({"groupname": groupname, "rolename": rolename}))?,
        )
        .await
    }

    // Default ACL policy

    /// Fetch the broker-wide default ACL policy
    pub async fn get_default_acl_access(&self) -> DynsecResult<Vec<DefaultAclEntry>> {
        let data: DefaultAclData = self
            .send_expecting("getDefaultACLAccess", Map::new())
            .await?;
        Ok(data.acls)
    }

    /// Replace the broker-wide default ACL policy
    pub async fn set_default_acl_access(&self, acls: Vec<DefaultAclEntry>) -> DynsecResult<()> {
        self.send_void("setDefaultACLAccess", to_object(&json!({"acls": acls}))?)
            .await
    }
}

/// Serialize command parameters into the open JSON object the wire expects
fn to_object<T: Serialize>(params: &T) -> DynsecResult<Map<String, Value>> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        other => Err(DynsecError::configuration(format!(
            "command parameters must serialize to an object, got {other}"
        ))),
    }
}

// Projection wrappers for responses that nest their payload one level down
#[derive(serde::Deserialize)]
struct ClientData {
    client: ClientDetails,
}

#[derive(serde::Deserialize)]
struct RoleData {
    role: RoleDetails,
}

#[derive(serde::Deserialize)]
struct GroupData {
    group: GroupDetails,
}

#[derive(serde::Deserialize)]
struct DefaultAclData {
    acls: Vec<DefaultAclEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commands_require_connection() {
        let client = DynsecClient::new(DynsecConfig::default());
        assert!(!client.is_connected());

        let err = client.create_role("role1").await.unwrap_err();
        assert!(matches!(err, DynsecError::NotConnected));

        let err = client.send_command("listClients", Map::new()).await.unwrap_err();
        assert!(matches!(err, DynsecError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection_is_noop() {
        let mut client = DynsecClient::new(DynsecConfig::default());
        assert!(client.disconnect().await.is_ok());
    }

    #[test]
    fn test_to_object_rejects_non_objects() {
        let err = to_object(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, DynsecError::Configuration { .. }));

        let map = to_object(&json!({"username": "u1"})).unwrap();
        assert_eq!(map.get("username"), Some(&json!("u1")));
    }
}
