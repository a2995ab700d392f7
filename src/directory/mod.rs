use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod store;

pub use store::SensorDirectory;

/// Occupancy state of a sensor. `Unknown` means the sensor registered but has
/// never reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Unknown,
    Empty,
    Occupied,
}

impl SensorStatus {
    pub fn from_occupied(occupied: bool) -> Self {
        if occupied {
            SensorStatus::Occupied
        } else {
            SensorStatus::Empty
        }
    }

    /// True once the sensor has reported at least one occupancy state.
    pub fn is_reported(&self) -> bool {
        !matches!(self, SensorStatus::Unknown)
    }

    /// Nullable INTEGER column mapping: NULL = Unknown, 0 = Empty, 1 = Occupied.
    pub(crate) fn from_column(value: Option<i64>) -> Self {
        match value {
            None => SensorStatus::Unknown,
            Some(0) => SensorStatus::Empty,
            Some(_) => SensorStatus::Occupied,
        }
    }
}

/// Canonical per-sensor record held by the directory.
#[derive(Clone, Debug, Serialize)]
pub struct SensorRecord {
    /// Directory-assigned identifier, immutable once created.
    pub id: i64,

    /// Hierarchical `/`-separated path; unique per sensor and used as the
    /// sensor's pub/sub topic prefix.
    pub location: String,

    pub status: SensorStatus,

    /// Hardware/firmware class announced at registration.
    pub sensor_type: String,

    /// Last-known network address, if any has been reported.
    pub ip: Option<String>,

    /// Timestamp of the last accepted state change (not the last message
    /// received), always UTC.
    pub updated_at: DateTime<Utc>,
}
