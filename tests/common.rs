#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use mosquitto_dynsec::{
    DynsecClient, DynsecConfig, DynsecResult, Transport, TransportMessage,
};

/// In-memory transport for integration tests: records outbound traffic and
/// lets tests inject inbound response payloads
#[derive(Default)]
pub struct MemoryTransport {
    pub published: Mutex<Vec<(String, Vec<u8>)>>,
    pub subscribed: Mutex<Vec<String>>,
    pub disconnected: Mutex<bool>,
}

impl MemoryTransport {
    /// Command names published so far, in order
    pub fn published_commands(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, payload)| serde_json::from_slice::<Value>(payload).ok())
            .filter_map(|batch| {
                batch["commands"][0]["command"]
                    .as_str()
                    .map(ToString::to_string)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DynsecResult<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> DynsecResult<()> {
        self.subscribed.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> DynsecResult<()> {
        *self.disconnected.lock().unwrap() = true;
        Ok(())
    }
}

/// A client wired to a [`MemoryTransport`], plus the handles tests need to
/// drive it
pub struct TestHarness {
    pub client: DynsecClient,
    pub transport: Arc<MemoryTransport>,
    pub inbound: mpsc::Sender<TransportMessage>,
    pub response_topic: String,
}

impl TestHarness {
    /// Build a connected client with the given command timeout
    pub fn connect(timeout_seconds: u64) -> Self {
        init_tracing();

        let config = DynsecConfig::new().with_timeout_seconds(timeout_seconds);
        let response_topic = config.response_topic();
        let mut client = DynsecClient::new(config);

        let transport = Arc::new(MemoryTransport::default());
        let (inbound, receiver) = mpsc::channel(16);
        client.attach_transport(transport.clone(), receiver);

        Self {
            client,
            transport,
            inbound,
            response_topic,
        }
    }

    /// Deliver a raw payload on the response topic
    pub async fn deliver(&self, payload: Value) {
        self.inbound
            .send(TransportMessage {
                topic: self.response_topic.clone(),
                payload: payload.to_string().into_bytes(),
            })
            .await
            .expect("dispatcher should still be running");
    }

    /// Deliver a void success response for `command`
    pub async fn respond_ok(&self, command: &str) {
        self.deliver(serde_json::json!({"responses": [{"command": command}]}))
            .await;
    }

    /// Deliver a data-carrying response for `command`
    pub async fn respond_data(&self, command: &str, data: Value) {
        self.deliver(serde_json::json!({"responses": [{"command": command, "data": data}]}))
            .await;
    }

    /// Deliver an error response for `command`
    pub async fn respond_error(&self, command: &str, error: &str) {
        self.deliver(serde_json::json!({"responses": [{"command": command, "error": error}]}))
            .await;
    }
}

/// Turn a JSON object literal into command parameters
pub fn params(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

/// Initialize test logging once; respects RUST_LOG
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
