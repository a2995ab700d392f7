//! MQTT client wrapper for the sensor fleet broker.
//!
//! The fleet publishes on location-derived topics, so the server subscribes
//! to the `#` wildcard on connect and classifies every message downstream.

use crate::config::MqttConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Raw message received from the broker.
#[derive(Debug, Clone)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Fire-and-forget publisher for outbound device commands.
///
/// A trait so the reset path can be exercised in tests without a broker.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

/// MQTT client holding the connection event loop.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self { client, event_loop }
    }

    /// Publisher handle usable from other tasks.
    pub fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    /// Run the MQTT event loop, forwarding inbound publishes to `tx`.
    ///
    /// The wildcard subscription is issued on every ConnAck: sessions are
    /// clean, so a broker restart would otherwise leave the server connected
    /// but deaf. Runs until the receiving side hangs up; connection errors
    /// trigger a delayed reconnect through the event loop.
    pub async fn run(mut self, tx: mpsc::Sender<MqttMessage>) {
        info!("Starting MQTT event loop");

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to broker, subscribing to all topics");
                    if let Err(e) = self.client.subscribe("#", QoS::AtMostOnce).await {
                        error!(error = %e, "Failed to subscribe to broker wildcard");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT message received");

                    let msg = MqttMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                    if tx.send(msg).await.is_err() {
                        error!("MQTT message channel closed");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = ?e, "MQTT connection error");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

/// Cloneable publish handle backed by the shared client.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl CommandPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        debug!(topic = %topic, payload = %payload, "Publishing command");
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes())
            .await
            .with_context(|| format!("Failed to publish to '{}'", topic))
    }
}
