//! Event envelope published on the segmented bus

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as epoch milliseconds
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Type tag carried by every event and stream frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    #[serde(rename = "connection.established")]
    ConnectionEstablished,
    #[serde(rename = "location.updated")]
    LocationUpdated,
    #[serde(rename = "geofence.arrived")]
    GeofenceArrived,
    #[serde(rename = "tracking.started")]
    TrackingStarted,
    #[serde(rename = "tracking.stopped")]
    TrackingStopped,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ConnectionEstablished => "connection.established",
            EventType::LocationUpdated => "location.updated",
            EventType::GeofenceArrived => "geofence.arrived",
            EventType::TrackingStarted => "tracking.started",
            EventType::TrackingStopped => "tracking.stopped",
            EventType::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One telemetry event. Immutable once constructed.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: u64,
    pub data: Map<String, Value>,
}

impl Event {
    /// Build an event from a JSON object payload, stamped with the
    /// current time. A non-object payload becomes an empty object.
    pub fn new(event_type: EventType, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { event_type, timestamp: epoch_ms(), data }
    }

    /// Payload serialized for a stream frame
    pub fn data_json(&self) -> String {
        serde_json::to_string(&self.data).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_wire_names() {
        assert_eq!(EventType::LocationUpdated.as_str(), "location.updated");
        assert_eq!(
            serde_json::to_string(&EventType::GeofenceArrived).unwrap(),
            "\"geofence.arrived\""
        );
    }

    #[test]
    fn test_event_payload_round_trip() {
        let event = Event::new(
            EventType::LocationUpdated,
            json!({"technician_id": "t1", "latitude": 21.0285}),
        );
        assert!(event.timestamp > 0);
        assert_eq!(event.data["technician_id"], "t1");
        assert!(event.data_json().contains("21.0285"));
    }

    #[test]
    fn test_non_object_payload_becomes_empty() {
        let event = Event::new(EventType::Heartbeat, json!(42));
        assert!(event.data.is_empty());
        assert_eq!(event.data_json(), "{}");
    }
}
