use crate::directory::SensorDirectory;
use crate::mqtt::CommandPublisher;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("sensor {0} not found")]
    NotFound(i64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Operator-initiated sensor removal.
///
/// Publishes the reset command before deleting the record so the device is
/// still addressable on its location-derived topic when the command goes
/// out. The device re-registers itself later through an identity broadcast.
pub struct ResetCoordinator {
    directory: Arc<SensorDirectory>,
    publisher: Arc<dyn CommandPublisher>,
}

impl ResetCoordinator {
    pub fn new(directory: Arc<SensorDirectory>, publisher: Arc<dyn CommandPublisher>) -> Self {
        Self {
            directory,
            publisher,
        }
    }

    /// Reset the sensor with the given id: command the device to
    /// reinitialize, then deregister it.
    pub async fn reset(&self, id: i64) -> Result<(), ResetError> {
        let record = self
            .directory
            .find_by_id(id)?
            .ok_or(ResetError::NotFound(id))?;

        // Fire-and-forget; the protocol has no acknowledgment. A failed
        // publish is logged and deletion proceeds — the device simply misses
        // the reset and re-registers on its own schedule.
        let topic = format!("{}/rst", record.location);
        if let Err(e) = self.publisher.publish(&topic, "1").await {
            warn!(topic = %topic, error = %e, "Failed to publish reset command");
        }

        self.directory.delete_by_id(id)?;
        info!(id, location = %record.location, "Sensor reset and deregistered");
        Ok(())
    }
}
