//! # Correlation Engine
//!
//! Matches asynchronous control-API responses back to the command that caused
//! them. The broker offers no request identity, so the command name itself is
//! the correlation key: at most one command per name may be outstanding, each
//! outstanding command holds a single-settlement waiter in the pending table,
//! and every waiter races its response against the configured timeout.
//!
//! Settlement is single-shot by construction: a waiter is a oneshot channel
//! and its table entry is removed before the settlement is sent. Timed-out
//! commands also remove their entry, so a later duplicate of the same name is
//! never spuriously rejected and a late response is reported as unmatched
//! rather than silently consumed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::error::{DynsecError, DynsecResult};
use crate::protocol::{CommandBatch, CommandEnvelope, ResponseBatch};
use crate::transport::Transport;

/// Outcome delivered to a pending waiter: the broker's data payload on
/// success, a typed error otherwise
type Settlement = Result<Option<Value>, DynsecError>;

/// Ephemeral record for one outstanding command. Created at issue time,
/// settled exactly once, removed from the table before settlement.
struct PendingWaiter {
    settle: oneshot::Sender<Settlement>,
}

/// Counters describing response dispatch activity
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub responses_received: u64,
    pub unmatched_responses: u64,
    pub remote_errors: u64,
    pub parse_errors: u64,
    pub last_response_at: Option<SystemTime>,
}

/// Request/response correlation over a fire-and-forget transport
///
/// Clones share the pending table and transport, so the dispatcher task and
/// command issuers operate on the same state.
#[derive(Clone)]
pub struct CorrelationEngine {
    transport: Arc<dyn Transport>,
    pending: Arc<Mutex<HashMap<String, PendingWaiter>>>,
    stats: Arc<Mutex<DispatchStats>>,
    command_topic: String,
    command_timeout: Duration,
}

impl CorrelationEngine {
    /// Create an engine publishing to `command_topic` with the given
    /// per-command timeout
    pub fn new(
        transport: Arc<dyn Transport>,
        command_topic: impl Into<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            stats: Arc::new(Mutex::new(DispatchStats::default())),
            command_topic: command_topic.into(),
            command_timeout,
        }
    }

    /// Issue a named command and wait for its single matching response
    ///
    /// Fails immediately with [`DynsecError::CommandAlreadyPending`] when a
    /// command of the same name is still outstanding; callers must serialize
    /// same-named calls. Otherwise publishes exactly one message and settles
    /// with whichever comes first: the matching response (resolving with its
    /// `data`, or rejecting with the broker's error message) or the timeout.
    #[instrument(skip_all, fields(command = %command))]
    pub async fn issue_command(
        &self,
        command: &str,
        parameters: Map<String, Value>,
    ) -> DynsecResult<Option<Value>> {
        let receiver = self.register_waiter(command)?;

        let batch = CommandBatch::single(CommandEnvelope::new(command, parameters));
        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                self.remove_waiter(command);
                return Err(e.into());
            }
        };

        debug!(topic = %self.command_topic, "Publishing command");
        if let Err(e) = self.transport.publish(&self.command_topic, payload).await {
            self.remove_waiter(command);
            return Err(e);
        }

        match timeout(self.command_timeout, receiver).await {
            Ok(Ok(settlement)) => settlement,
            // Waiter dropped without settlement: the engine was torn down
            Ok(Err(_)) => Err(DynsecError::Disconnected),
            Err(_) => {
                self.remove_waiter(command);
                warn!(
                    timeout_seconds = self.command_timeout.as_secs(),
                    "Command timed out"
                );
                Err(DynsecError::command_timeout(
                    command,
                    self.command_timeout.as_secs(),
                ))
            }
        }
    }

    /// Dispatch one inbound payload from the response topic
    ///
    /// Envelopes are settled strictly in arrival order. A malformed payload
    /// (missing or non-array `responses`) is counted and returned as an error
    /// for the whole dispatch call since it cannot be attributed to one
    /// command. An envelope naming no pending command is counted and logged,
    /// never an error.
    pub fn dispatch(&self, payload: &[u8]) -> DynsecResult<()> {
        let batch = match ResponseBatch::parse(payload) {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.lock().unwrap().parse_errors += 1;
                return Err(e);
            }
        };

        for envelope in batch.responses {
            {
                let mut stats = self.stats.lock().unwrap();
                stats.responses_received += 1;
                stats.last_response_at = Some(SystemTime::now());
            }

            let waiter = self.pending.lock().unwrap().remove(&envelope.command);
            let Some(waiter) = waiter else {
                self.stats.lock().unwrap().unmatched_responses += 1;
                warn!(
                    command = %envelope.command,
                    "Received response for a command with no pending waiter"
                );
                continue;
            };

            let settlement = match envelope.error {
                Some(message) => {
                    self.stats.lock().unwrap().remote_errors += 1;
                    Err(DynsecError::remote(&envelope.command, message))
                }
                None => Ok(envelope.data),
            };

            if waiter.settle.send(settlement).is_err() {
                debug!(
                    command = %envelope.command,
                    "Waiter already abandoned, dropping settlement"
                );
            }
        }

        Ok(())
    }

    /// Settle every outstanding waiter with [`DynsecError::Disconnected`]
    ///
    /// Called on teardown so no caller is left waiting forever. Returns the
    /// number of waiters settled.
    pub fn abort_all_disconnected(&self) -> usize {
        let drained: Vec<(String, PendingWaiter)> =
            self.pending.lock().unwrap().drain().collect();

        let count = drained.len();
        for (command, waiter) in drained {
            debug!(command = %command, "Settling pending command on teardown");
            let _ = waiter.settle.send(Err(DynsecError::Disconnected));
        }
        count
    }

    /// Close the underlying transport
    pub async fn close(&self) -> DynsecResult<()> {
        self.transport.disconnect().await
    }

    /// Names of the currently outstanding commands
    pub fn pending_commands(&self) -> Vec<String> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }

    /// Dispatch activity counters
    pub fn stats(&self) -> DispatchStats {
        self.stats.lock().unwrap().clone()
    }

    fn register_waiter(&self, command: &str) -> DynsecResult<oneshot::Receiver<Settlement>> {
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(command) {
            return Err(DynsecError::command_already_pending(command));
        }

        let (settle, receiver) = oneshot::channel();
        pending.insert(command.to_string(), PendingWaiter { settle });
        Ok(receiver)
    }

    fn remove_waiter(&self, command: &str) {
        self.pending.lock().unwrap().remove(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    /// Transport that records publishes and never delivers anything
    #[derive(Default)]
    struct RecordingTransport {
        published: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> DynsecResult<()> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload));
            Ok(())
        }

        async fn subscribe(&self, _topic: &str) -> DynsecResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> DynsecResult<()> {
            Ok(())
        }
    }

    /// Transport whose publish always fails
    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> DynsecResult<()> {
            Err(DynsecError::transport("broker unreachable"))
        }

        async fn subscribe(&self, _topic: &str) -> DynsecResult<()> {
            Ok(())
        }

        async fn disconnect(&self) -> DynsecResult<()> {
            Ok(())
        }
    }

    fn engine_with(transport: Arc<dyn Transport>) -> CorrelationEngine {
        CorrelationEngine::new(
            transport,
            "$CONTROL/dynamic-security/v1",
            Duration::from_secs(2),
        )
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_command_publishes_batch_payload() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine_with(transport.clone());

        let issue = engine.issue_command("createClient", params(json!({"username": "u1"})));
        let respond = async {
            // Yield so the command registers and publishes first
            tokio::task::yield_now().await;
            engine
                .dispatch(br#"{"responses":[{"command":"createClient"}]}"#)
                .unwrap();
        };

        let (result, ()) = tokio::join!(issue, respond);
        assert_eq!(result.unwrap(), None);

        let published = transport.published.lock().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "$CONTROL/dynamic-security/v1");
        let payload: Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(
            payload,
            json!({"commands": [{"command": "createClient", "username": "u1"}]})
        );
    }

    #[tokio::test]
    async fn test_duplicate_command_rejected_while_pending() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let first = engine.issue_command("getClient", params(json!({"username": "u1"})));
        let second = async {
            tokio::task::yield_now().await;

            let err = engine
                .issue_command("getClient", params(json!({"username": "u2"})))
                .await
                .unwrap_err();
            assert!(matches!(err, DynsecError::CommandAlreadyPending { .. }));

            // First command is unaffected by the rejected duplicate
            engine
                .dispatch(br#"{"responses":[{"command":"getClient","data":{"client":{}}}]}"#)
                .unwrap();
        };

        let (first_result, ()) = tokio::join!(first, second);
        assert_eq!(first_result.unwrap(), Some(json!({"client": {}})));
    }

    #[tokio::test]
    async fn test_remote_error_rejects_waiter() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let issue = engine.issue_command("deleteRole", params(json!({"rolename": "nope"})));
        let respond = async {
            tokio::task::yield_now().await;
            engine
                .dispatch(br#"{"responses":[{"command":"deleteRole","error":"Role not found"}]}"#)
                .unwrap();
        };

        let (result, ()) = tokio::join!(issue, respond);
        match result.unwrap_err() {
            DynsecError::Remote { command, message } => {
                assert_eq!(command, "deleteRole");
                assert_eq!(message, "Role not found");
            }
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(engine.stats().remote_errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_pending_entry() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let err = engine
            .issue_command("listClients", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DynsecError::CommandTimeout { .. }));

        // Entry is gone, so the same name can be issued again immediately
        assert!(engine.pending_commands().is_empty());

        // A late response is unmatched, not an error
        engine
            .dispatch(br#"{"responses":[{"command":"listClients","data":{"totalCount":0}}]}"#)
            .unwrap();
        assert_eq!(engine.stats().unmatched_responses, 1);
    }

    #[tokio::test]
    async fn test_publish_failure_clears_waiter() {
        let engine = engine_with(Arc::new(FailingTransport));

        let err = engine
            .issue_command("createGroup", params(json!({"groupname": "g1"})))
            .await
            .unwrap_err();
        assert!(matches!(err, DynsecError::Transport { .. }));
        assert!(engine.pending_commands().is_empty());
    }

    #[tokio::test]
    async fn test_batch_settles_in_arrival_order() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let first = engine.issue_command("createRole", params(json!({"rolename": "r1"})));
        let second = engine.issue_command("createGroup", params(json!({"groupname": "g1"})));
        let respond = async {
            tokio::task::yield_now().await;
            engine
                .dispatch(
                    br#"{"responses":[
                        {"command":"createGroup","data":{"order":1}},
                        {"command":"createRole","data":{"order":2}}
                    ]}"#,
                )
                .unwrap();
        };

        let (first_result, second_result, ()) = tokio::join!(first, second, respond);
        assert_eq!(first_result.unwrap(), Some(json!({"order": 2})));
        assert_eq!(second_result.unwrap(), Some(json!({"order": 1})));
        assert_eq!(engine.stats().responses_received, 2);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_dispatch_error() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let err = engine.dispatch(br#"{"responses": 42}"#).unwrap_err();
        assert!(matches!(err, DynsecError::MalformedResponse { .. }));
        assert_eq!(engine.stats().parse_errors, 1);
    }

    #[tokio::test]
    async fn test_abort_all_settles_pending_with_disconnected() {
        let engine = engine_with(Arc::new(RecordingTransport::default()));

        let issue = engine.issue_command("listGroups", Map::new());
        let teardown = async {
            tokio::task::yield_now().await;
            assert_eq!(engine.abort_all_disconnected(), 1);
        };

        let (result, ()) = tokio::join!(issue, teardown);
        assert!(matches!(result.unwrap_err(), DynsecError::Disconnected));
        assert!(engine.pending_commands().is_empty());
    }
}
