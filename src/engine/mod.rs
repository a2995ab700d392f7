use crate::directory::{SensorDirectory, SensorStatus};
use crate::message::{classify, ClassifiedMessage};
use crate::mqtt::MqttMessage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Status change event pushed verbatim to live observers.
///
/// Emitted once per accepted state transition, never for repeated identical
/// reports or address updates.
#[derive(Clone, Debug, Serialize)]
pub struct StatusChange {
    pub id: i64,
    pub location: String,
    pub status: SensorStatus,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Reconciliation engine: applies classified messages against the sensor
/// directory and broadcasts genuine state changes.
///
/// All read-modify-write sequences are pushed into atomic directory
/// primitives, so concurrent duplicate reports cannot double-emit and
/// concurrent identity broadcasts cannot double-register.
pub struct ReconcileEngine {
    directory: Arc<SensorDirectory>,

    /// Broadcast channel for status change events
    change_tx: broadcast::Sender<StatusChange>,

    /// Firmware tag recognized in identity broadcasts
    firmware_tag: String,
}

impl ReconcileEngine {
    pub fn new(directory: Arc<SensorDirectory>, firmware_tag: impl Into<String>) -> Self {
        let (change_tx, _) = broadcast::channel(256);
        Self {
            directory,
            change_tx,
            firmware_tag: firmware_tag.into(),
        }
    }

    /// Subscribe to status change events
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.change_tx.subscribe()
    }

    /// Classify one inbound message and apply it.
    ///
    /// Unrecognized messages and reports for unregistered locations are
    /// dropped without side effects. A returned error means a directory
    /// failure; the message is not retried (broker redelivery covers that).
    pub fn apply(&self, topic: &str, payload: &[u8]) -> Result<()> {
        match classify(topic, payload, &self.firmware_tag) {
            ClassifiedMessage::StateReport { location, occupied } => {
                self.handle_state_report(&location, occupied)
            }
            ClassifiedMessage::IdentityBroadcast {
                location,
                sensor_type,
            } => self.handle_identity_broadcast(&location, &sensor_type),
            ClassifiedMessage::AddressReport { location, address } => {
                self.handle_address_report(&location, &address)
            }
            ClassifiedMessage::Unrecognized => {
                debug!(topic = %topic, "Unrecognized message, ignoring");
                Ok(())
            }
        }
    }

    /// Compare-and-update: persist and broadcast only on a real transition.
    fn handle_state_report(&self, location: &str, occupied: bool) -> Result<()> {
        match self
            .directory
            .set_status_if_changed(location, occupied, Utc::now())?
        {
            Some(record) => {
                info!(
                    location = %record.location,
                    status = ?record.status,
                    "Sensor status changed"
                );
                let change = StatusChange {
                    id: record.id,
                    location: record.location,
                    status: record.status,
                    updated_at: record.updated_at,
                };
                // Best-effort fan-out; send errors only when no observer is
                // connected.
                let _ = self.change_tx.send(change);
            }
            None => {
                // Unregistered location or no transition. Either way the
                // report is dropped without creating or notifying.
                debug!(location = %location, occupied, "State report without transition, dropped");
            }
        }
        Ok(())
    }

    /// Auto-registration: insert-if-absent keyed on the location.
    fn handle_identity_broadcast(&self, location: &str, sensor_type: &str) -> Result<()> {
        if self.directory.create_if_absent(location, sensor_type)? {
            info!(location = %location, sensor_type = %sensor_type, "Registered new sensor");
        } else {
            debug!(location = %location, "Identity broadcast for registered location, ignored");
        }
        Ok(())
    }

    /// Address updates are write-always: no comparison, no notification.
    fn handle_address_report(&self, location: &str, address: &str) -> Result<()> {
        debug!(location = %location, address = %address, "Address report");
        self.directory.update_ip(location, address)
    }

    /// Ingest loop: drains the MQTT channel until the sender side hangs up.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<MqttMessage>) {
        info!("Starting reconciliation ingest loop");

        while let Some(msg) = rx.recv().await {
            if let Err(e) = self.apply(&msg.topic, &msg.payload) {
                error!(topic = %msg.topic, error = %e, "Failed to apply message, dropping");
            }
        }

        warn!("MQTT ingest channel closed, ingest loop stopped");
    }
}
