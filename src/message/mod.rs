use std::str;


/// Classified inbound pub/sub message.
///
/// Classification is pure: it looks only at the topic, the payload bytes and
/// the recognized firmware tag, and never touches the directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassifiedMessage {
    /// Occupancy report on the sensor's own topic, payload `"0"` or `"1"`.
    StateReport { location: String, occupied: bool },
    /// Registration broadcast on `<location>/id`, payload
    /// `<deviceId>.<firmwareTag>.<sensorType>`.
    IdentityBroadcast {
        location: String,
        sensor_type: String,
    },
    /// Network address report on `<location>/ip`, payload is the address
    /// string verbatim (not validated here).
    AddressReport { location: String, address: String },
    /// Anything else; dropped without side effects.
    Unrecognized,
}

/// Classify a raw MQTT message.
///
/// `firmware_tag` is the tag a sensor must announce in the middle field of
/// its identity payload to be considered one of ours (e.g. "StallSense").
pub fn classify(topic: &str, payload: &[u8], firmware_tag: &str) -> ClassifiedMessage {
    // State reports are the hot path: payload is exactly "0" or "1" and the
    // topic is the sensor's location itself.
    if payload == b"0" || payload == b"1" {
        return ClassifiedMessage::StateReport {
            location: topic.to_string(),
            occupied: payload == b"1",
        };
    }

    let text = match str::from_utf8(payload) {
        Ok(s) => s,
        Err(_) => return ClassifiedMessage::Unrecognized,
    };

    if let Some(location) = strip_channel(topic, "id") {
        let fields: Vec<&str> = text.split('.').collect();
        if fields.len() >= 3 && fields[1] == firmware_tag {
            return ClassifiedMessage::IdentityBroadcast {
                location: location.to_string(),
                // Last dot-field carries the hardware/firmware class.
                sensor_type: fields[fields.len() - 1].to_string(),
            };
        }
        return ClassifiedMessage::Unrecognized;
    }

    if let Some(location) = strip_channel(topic, "ip") {
        return ClassifiedMessage::AddressReport {
            location: location.to_string(),
            address: text.to_string(),
        };
    }

    ClassifiedMessage::Unrecognized
}

/// If the topic's trailing segment equals `channel`, return the location
/// prefix. A bare `"id"`/`"ip"` topic has no location and does not match.
fn strip_channel<'a>(topic: &'a str, channel: &str) -> Option<&'a str> {
    let prefix = topic.strip_suffix(channel)?.strip_suffix('/')?;
    if prefix.is_empty() {
        return None;
    }
    Some(prefix)
}
