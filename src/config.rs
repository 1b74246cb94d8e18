//! # Client Configuration
//!
//! Configuration for connecting to a Mosquitto broker and addressing its
//! dynamic-security control API, including connection defaults, the per-engine
//! command timeout, and the topic naming helpers for the fixed command and
//! response destinations.

use serde::{Deserialize, Serialize};

use crate::error::{DynsecError, DynsecResult};

/// Transport scheme used to reach the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportScheme {
    /// Plain TCP
    Mqtt,
    /// TLS with the platform default configuration
    Mqtts,
}

/// Configuration for the dynamic-security client
///
/// # Examples
///
/// ```rust
/// use mosquitto_dynsec::config::DynsecConfig;
///
/// // Defaults match a local unsecured broker
/// let config = DynsecConfig::default();
/// assert_eq!(config.host, "localhost");
/// assert_eq!(config.port, 1883);
/// assert_eq!(config.timeout_seconds, 2);
/// assert_eq!(config.command_topic(), "$CONTROL/dynamic-security/v1");
///
/// // Builder-style overrides
/// let config = DynsecConfig::new()
///     .with_host("broker.internal")
///     .with_port(8883)
///     .with_credentials("admin-user", "secret");
/// assert_eq!(config.username, "admin-user");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynsecConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// Transport scheme (plain TCP or TLS)
    pub scheme: TransportScheme,

    /// Username for broker authentication
    pub username: String,

    /// Password for broker authentication, if required
    pub password: Option<String>,

    /// MQTT client id; generated from the process id when unset
    pub client_id: Option<String>,

    /// Seconds each issued command may wait for its response
    pub timeout_seconds: u64,

    /// Dynamic-security control API version segment of the control topics
    pub api_version: String,
}

impl Default for DynsecConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            scheme: TransportScheme::Mqtt,
            username: "admin-user".to_string(),
            password: None,
            client_id: None,
            timeout_seconds: 2,
            api_version: "v1".to_string(),
        }
    }
}

impl DynsecConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker hostname
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the transport scheme
    pub fn with_scheme(mut self, scheme: TransportScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the username and password used for broker authentication
    pub fn with_credentials<U: Into<String>, P: Into<String>>(
        mut self,
        username: U,
        password: P,
    ) -> Self {
        self.username = username.into();
        self.password = Some(password.into());
        self
    }

    /// Set the MQTT client id
    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Set the per-command timeout in seconds
    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the control API version
    pub fn with_api_version<S: Into<String>>(mut self, api_version: S) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DynsecResult<()> {
        if self.host.is_empty() {
            return Err(DynsecError::configuration("host must not be empty"));
        }

        if self.timeout_seconds == 0 {
            return Err(DynsecError::configuration(
                "timeout_seconds must be greater than zero",
            ));
        }

        if self.api_version.is_empty() {
            return Err(DynsecError::configuration("api_version must not be empty"));
        }

        Ok(())
    }

    /// Topic commands are published to
    pub fn command_topic(&self) -> String {
        format!("$CONTROL/dynamic-security/{}", self.api_version)
    }

    /// Topic the broker publishes responses to, subscribed once at connect time
    pub fn response_topic(&self) -> String {
        format!("{}/response", self.command_topic())
    }

    /// Broker URL for display purposes
    pub fn broker_url(&self) -> String {
        let scheme = match self.scheme {
            TransportScheme::Mqtt => "mqtt",
            TransportScheme::Mqtts => "mqtts",
        };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}
