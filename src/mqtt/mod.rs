// MQTT transport: broker connection, subscribe-all ingestion, command publish

mod client;

pub use client::{CommandPublisher, MqttClient, MqttMessage, MqttPublisher};
