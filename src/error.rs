//! # Dynsec Error Types
//!
//! Structured error handling for the dynamic-security client using thiserror
//! for typed error variants instead of stringly-typed rejections.

use thiserror::Error;

/// Result type alias for dynsec operations
pub type DynsecResult<T> = Result<T, DynsecError>;

/// Error types for dynamic-security client operations
#[derive(Debug, Error)]
pub enum DynsecError {
    #[error("Not connected: call connect() before issuing commands")]
    NotConnected,

    #[error("Command already pending: {command}")]
    CommandAlreadyPending { command: String },

    #[error("Command timed out: {command} received no response within {timeout_seconds}s")]
    CommandTimeout {
        command: String,
        timeout_seconds: u64,
    },

    #[error("Broker rejected command {command}: {message}")]
    Remote { command: String, message: String },

    #[error("Malformed response payload: {message}")]
    MalformedResponse { message: String },

    #[error("Response for command {command} carried no data payload")]
    MissingResponseData { command: String },

    #[error("Disconnected while command was pending")]
    Disconnected,

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DynsecError {
    /// Create a command already pending error
    pub fn command_already_pending(command: impl Into<String>) -> Self {
        Self::CommandAlreadyPending {
            command: command.into(),
        }
    }

    /// Create a command timeout error
    pub fn command_timeout(command: impl Into<String>, timeout_seconds: u64) -> Self {
        Self::CommandTimeout {
            command: command.into(),
            timeout_seconds,
        }
    }

    /// Create a remote error carrying the broker's message verbatim
    pub fn remote(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed_response(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Create a missing response data error
    pub fn missing_response_data(command: impl Into<String>) -> Self {
        Self::MissingResponseData {
            command: command.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if error is recoverable (worth retrying)
    ///
    /// Per-command failures like timeouts and contention clear on their own;
    /// protocol violations and remote rejections do not.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DynsecError::CommandTimeout { .. }
                | DynsecError::CommandAlreadyPending { .. }
                | DynsecError::Transport { .. }
        )
    }
}

impl From<rumqttc::ClientError> for DynsecError {
    fn from(err: rumqttc::ClientError) -> Self {
        DynsecError::transport(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for DynsecError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        DynsecError::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let pending = DynsecError::command_already_pending("createClient");
        assert!(matches!(pending, DynsecError::CommandAlreadyPending { .. }));

        let timeout = DynsecError::command_timeout("listClients", 2);
        assert!(matches!(timeout, DynsecError::CommandTimeout { .. }));

        let remote = DynsecError::remote("deleteRole", "Role not found");
        assert!(matches!(remote, DynsecError::Remote { .. }));
    }

    #[test]
    fn test_error_display() {
        let timeout = DynsecError::command_timeout("listClients", 2);
        let display = format!("{timeout}");
        assert!(display.contains("listClients"));
        assert!(display.contains("2s"));

        let remote = DynsecError::remote("deleteRole", "Role not found");
        let display = format!("{remote}");
        assert!(display.contains("deleteRole"));
        assert!(display.contains("Role not found"));
    }

    #[test]
    fn test_serialization_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let err: DynsecError = json_err.into();
        assert!(matches!(err, DynsecError::Serialization(_)));
    }

    #[test]
    fn test_recoverability() {
        assert!(DynsecError::command_timeout("getClient", 2).is_recoverable());
        assert!(DynsecError::command_already_pending("getClient").is_recoverable());
        assert!(!DynsecError::remote("getClient", "no").is_recoverable());
        assert!(!DynsecError::malformed_response("bad payload").is_recoverable());
        assert!(!DynsecError::NotConnected.is_recoverable());
    }
}
