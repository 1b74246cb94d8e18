//! # Mosquitto Dynamic Security Client
//!
//! Async client for the Mosquitto dynamic-security `$CONTROL` API. The broker
//! side is plain publish/subscribe with no request identity, so this crate
//! layers a request/response correlation engine on top: each issued command
//! registers a pending waiter keyed by its command name, races the matching
//! response against a configurable timeout, and settles exactly once.
//!
//! The typed facade on [`DynsecClient`] covers the client, role, group, and
//! default-ACL administration commands; [`DynsecClient::send_command`] is the
//! raw escape hatch for anything else.

pub mod client;
pub mod commands;
pub mod config;
pub mod correlation;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-export commonly used types for convenience
pub use client::DynsecClient;
pub use config::{DynsecConfig, TransportScheme};
pub use correlation::{CorrelationEngine, DispatchStats};
pub use error::{DynsecError, DynsecResult};
pub use protocol::{CommandBatch, CommandEnvelope, ResponseBatch, ResponseEnvelope};
pub use transport::{MqttTransport, Transport, TransportMessage};
