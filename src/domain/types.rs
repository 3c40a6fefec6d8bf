//! Shared types for technician tracking

use serde::{Deserialize, Serialize};

/// Workflow status of a tracked technician's presence record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Idle,
    Moving,
    Arrived,
    Working,
    Completed,
}

/// Workflow status of a booking as observed from the booking store.
///
/// The tracking core drives exactly one edge of this machine
/// (`Moving -> Arrived`); every other transition belongs to the booking
/// service and is only read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Assigned,
    Moving,
    Arrived,
    Working,
    Completed,
    Cancelled,
    Failed,
}

/// Inbound position report from a technician device
#[derive(Debug, Clone, Deserialize)]
pub struct LocationReport {
    pub technician_id: String,
    pub booking_id: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub heading: f64,
}

/// Latest known position and status for one technician.
///
/// Purely in-memory telemetry; not persisted across restarts.
#[derive(Debug, Clone, Serialize)]
pub struct TechPresence {
    pub technician_id: String,
    pub booking_id: String,
    pub status: PresenceStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub heading: f64,
    /// Epoch milliseconds of the most recent report, throttled or not
    pub last_update_ms: u64,
    /// Last computed distance to the booking destination, meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl TechPresence {
    pub fn new(technician_id: &str) -> Self {
        Self {
            technician_id: technician_id.to_string(),
            booking_id: String::new(),
            status: PresenceStatus::Idle,
            latitude: 0.0,
            longitude: 0.0,
            accuracy: 0.0,
            speed: 0.0,
            heading: 0.0,
            last_update_ms: 0,
            distance_m: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&PresenceStatus::Moving).unwrap(), "\"moving\"");
        assert_eq!(serde_json::to_string(&BookingStatus::Arrived).unwrap(), "\"arrived\"");
        assert_eq!(
            serde_json::from_str::<BookingStatus>("\"cancelled\"").unwrap(),
            BookingStatus::Cancelled
        );
    }

    #[test]
    fn test_new_presence_is_idle() {
        let presence = TechPresence::new("tech-1");
        assert_eq!(presence.status, PresenceStatus::Idle);
        assert!(presence.booking_id.is_empty());
        assert!(presence.distance_m.is_none());
    }

    #[test]
    fn test_location_report_optional_fields_default() {
        let report: LocationReport = serde_json::from_str(
            r#"{"technician_id":"t1","booking_id":"b1","latitude":21.0,"longitude":105.8}"#,
        )
        .unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.speed, 0.0);
        assert_eq!(report.heading, 0.0);
    }
}
