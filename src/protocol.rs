//! # Control API Wire Envelopes
//!
//! Payload shapes exchanged with the dynamic-security control topics. Commands
//! go out batched under a `commands` array and responses come back batched
//! under a `responses` array, zero or more per inbound message.
//!
//! ## Wire shapes
//!
//! Outbound: `{"commands":[{"command":"createClient","username":"u1"}]}`
//!
//! Inbound: `{"responses":[{"command":"createClient","data":{...}}]}` with an
//! optional `error` string when the broker rejected the command.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{DynsecError, DynsecResult};

/// One outbound request: the command name plus its parameters, flattened into
/// a single JSON object. The name doubles as the correlation key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    /// Operation name, e.g. "createClient"
    pub command: String,
    /// Open mapping of parameter names to JSON values, merged with `command`
    /// on the wire
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl CommandEnvelope {
    /// Create a command envelope
    pub fn new(command: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            command: command.into(),
            parameters,
        }
    }
}

/// Outbound batch wrapper; the control API accepts one or more commands per
/// publish, this client always sends exactly one
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandBatch {
    pub commands: Vec<CommandEnvelope>,
}

impl CommandBatch {
    /// Wrap a single command envelope
    pub fn single(envelope: CommandEnvelope) -> Self {
        Self {
            commands: vec![envelope],
        }
    }
}

/// One inbound reply. `data` and `error` are mutually exclusive in practice
/// but not enforced by the broker; `error` wins when both are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    /// Name of the command this response settles
    pub command: String,
    /// Success payload, absent on error and for void commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable failure description from the broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Inbound batch wrapper. A missing or non-array `responses` field makes the
/// whole payload malformed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseBatch {
    pub responses: Vec<ResponseEnvelope>,
}

impl ResponseBatch {
    /// Parse an inbound payload from the response topic
    pub fn parse(payload: &[u8]) -> DynsecResult<Self> {
        serde_json::from_slice(payload).map_err(|e| DynsecError::malformed_response(e.to_string()))
    }
}
