//! # Transport Layer
//!
//! The publish/subscribe collaborator the correlation engine runs on. The
//! [`Transport`] trait is the seam: the production [`MqttTransport`] speaks
//! MQTT through rumqttc, while tests substitute an in-memory implementation.
//! Inbound messages are delivered through an mpsc channel rather than a
//! callback, so the dispatcher stays a single sequential consumer.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::config::{DynsecConfig, TransportScheme};
use crate::error::{DynsecError, DynsecResult};

/// Buffer size for the inbound message channel
const MESSAGE_BUFFER_SIZE: usize = 64;

/// One inbound message delivered by the transport
#[derive(Debug, Clone)]
pub struct TransportMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Connected publish/subscribe channel
///
/// Implementations publish fire-and-forget messages on named destinations and
/// deliver inbound messages through the channel handed out at connect time.
/// At-most-once delivery per message, no ordering guarantee across distinct
/// destinations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload on a destination
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DynsecResult<()>;

    /// Subscribe to a destination
    async fn subscribe(&self, topic: &str) -> DynsecResult<()>;

    /// Close the transport gracefully
    async fn disconnect(&self) -> DynsecResult<()>;
}

/// MQTT transport backed by rumqttc
pub struct MqttTransport {
    client: AsyncClient,
}

/// Broker connect options for `config`
///
/// The username is always sent; brokers may authenticate by username alone,
/// so a missing password becomes an empty one rather than no credentials.
fn mqtt_options(config: &DynsecConfig, client_id: String) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(30));
    options.set_credentials(
        config.username.as_str(),
        config.password.as_deref().unwrap_or(""),
    );
    if config.scheme == TransportScheme::Mqtts {
        options.set_transport(rumqttc::Transport::tls_with_default_config());
    }
    options
}

impl MqttTransport {
    /// Connect to the broker described by `config`
    ///
    /// Resolves once the broker acknowledges the connection, returning the
    /// transport plus the receiver for inbound messages. Fails if the event
    /// loop errors before the acknowledgment arrives. The spawned event loop
    /// task ends when the broker closes the connection or the receiver is
    /// dropped.
    pub async fn connect(
        config: &DynsecConfig,
    ) -> DynsecResult<(Self, mpsc::Receiver<TransportMessage>)> {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| format!("dynsec-{}", std::process::id()));

        info!(
            broker = %config.broker_url(),
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let (client, mut event_loop) = AsyncClient::new(mqtt_options(config, client_id), 16);
        let (message_tx, message_rx) = mpsc::channel(MESSAGE_BUFFER_SIZE);
        let (ready_tx, ready_rx) = oneshot::channel::<DynsecResult<()>>();

        tokio::spawn(async move {
            let mut ready = Some(ready_tx);

            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                        debug!("Broker acknowledged connection");
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        let message = TransportMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if message_tx.send(message).await.is_err() {
                            debug!("Message receiver dropped, stopping MQTT event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        info!("Broker closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        match ready.take() {
                            // Failure before readiness rejects the connect call
                            Some(tx) => {
                                let _ = tx.send(Err(DynsecError::from(e)));
                            }
                            None => error!("MQTT event loop error: {}", e),
                        }
                        break;
                    }
                }
            }

            debug!("MQTT event loop ended");
        });

        ready_rx.await.map_err(|_| {
            DynsecError::transport("event loop ended before the connection was acknowledged")
        })??;

        info!("MQTT connection established");
        Ok((Self { client }, message_rx))
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> DynsecResult<()> {
        debug!(topic = %topic, bytes = payload.len(), "Publishing message");
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> DynsecResult<()> {
        debug!(topic = %topic, "Subscribing");
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    async fn disconnect(&self) -> DynsecResult<()> {
        info!("Disconnecting from MQTT broker");
        self.client.disconnect().await?;
        Ok(())
    }
}
