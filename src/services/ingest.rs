//! Location ingest coordination
//!
//! Orchestrates one inbound position report: throttle via the location
//! store, distance via the geo math, fan-out via the event bus, and
//! edge-triggered arrival detection against the booking's observed
//! workflow status.

use crate::domain::{
    BookingStatus, Event, EventType, LocationReport, PresenceStatus, TechPresence,
};
use crate::infra::{Audience, EventBus};
use crate::services::booking::BookingDirectory;
use crate::services::geo;
use crate::services::location_store::LocationStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Rejected ingest input. Client error, nothing mutated, nothing published.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("missing technician_id or booking_id")]
    MissingIds,
    #[error("invalid coordinates")]
    InvalidCoordinates,
}

/// Result of a processed (non-rejected) report
#[derive(Debug)]
pub enum IngestOutcome {
    /// Position stored but inside the throttle window; nothing published
    Throttled { presence: TechPresence },
    /// Position stored and broadcast
    Accepted {
        presence: TechPresence,
        /// Distance to the booking destination, when the destination is known
        distance_m: Option<f64>,
        arrived: bool,
    },
}

/// Coordinates the throttle gate, geofence evaluation and event fan-out
/// for position reports and tracking lifecycle changes.
pub struct LocationIngestCoordinator {
    store: Arc<LocationStore>,
    bus: Arc<EventBus>,
    directory: Arc<dyn BookingDirectory>,
    geofence_radius_m: f64,
}

impl LocationIngestCoordinator {
    pub fn new(
        store: Arc<LocationStore>,
        bus: Arc<EventBus>,
        directory: Arc<dyn BookingDirectory>,
        geofence_radius_m: f64,
    ) -> Self {
        Self { store, bus, directory, geofence_radius_m }
    }

    /// Process one position report.
    ///
    /// Note on the arrival edge: the booking status read and the status
    /// mutation are not transactional, so two concurrent reports for the
    /// same booking can both observe `moving` and both fire the edge.
    /// Duplicate `geofence.arrived` events are possible under that race
    /// and accepted for best-effort telemetry.
    pub async fn ingest(&self, report: &LocationReport) -> Result<IngestOutcome, IngestError> {
        if report.technician_id.is_empty() || report.booking_id.is_empty() {
            return Err(IngestError::MissingIds);
        }
        // A (0, 0) fix is a GPS failure mode, not a position
        if report.latitude == 0.0 && report.longitude == 0.0 {
            return Err(IngestError::InvalidCoordinates);
        }

        let (accepted, presence) = self.store.update(report);
        if !accepted {
            return Ok(IngestOutcome::Throttled { presence });
        }

        // A lookup failure must never suppress raw telemetry: degrade to
        // publishing the bare location without distance or arrival.
        let route = match self.directory.lookup(&report.booking_id).await {
            Ok(route) => Some(route),
            Err(e) => {
                warn!(booking_id = %report.booking_id, error = %e, "booking_lookup_failed");
                None
            }
        };

        let distance_m = route.as_ref().and_then(|r| r.destination).map(|dest| {
            let d = geo::distance_m(
                report.latitude,
                report.longitude,
                dest.latitude,
                dest.longitude,
            );
            self.store.set_distance(&report.technician_id, d);
            d
        });

        let location_event = Event::new(
            EventType::LocationUpdated,
            json!({
                "technician_id": report.technician_id,
                "booking_id": report.booking_id,
                "latitude": report.latitude,
                "longitude": report.longitude,
                "accuracy": report.accuracy,
                "speed": report.speed,
                "heading": report.heading,
                "distance": distance_m,
            }),
        );
        self.publish_tracking(&report.booking_id, &location_event);
        self.bus.publish(Audience::Technician, &report.technician_id, &location_event);

        // Edge-triggered arrival: fires only on the moving -> arrived
        // transition, never again once the booking has left `moving`.
        let mut arrived = false;
        if let (Some(distance), Some(route)) = (distance_m, route.as_ref()) {
            if geo::arrived(distance, self.geofence_radius_m)
                && route.status == BookingStatus::Moving
            {
                arrived = true;
                info!(
                    technician_id = %report.technician_id,
                    booking_id = %report.booking_id,
                    distance_m = %distance,
                    "geofence_arrived"
                );

                // The persisted record update and the real-time signal are
                // decoupled: a failed status write is logged, not fatal.
                if let Err(e) =
                    self.directory.set_status(&report.booking_id, BookingStatus::Arrived).await
                {
                    warn!(booking_id = %report.booking_id, error = %e, "booking_status_update_failed");
                }

                let geofence_event = Event::new(
                    EventType::GeofenceArrived,
                    json!({
                        "technician_id": report.technician_id,
                        "booking_id": report.booking_id,
                        "distance": distance,
                    }),
                );
                self.publish_tracking(&report.booking_id, &geofence_event);
            }
        }

        let presence = self.store.get(&report.technician_id).unwrap_or(presence);
        Ok(IngestOutcome::Accepted { presence, distance_m, arrived })
    }

    /// Begin a tracking session: presence and booking go `moving`, the
    /// customer and operators are notified.
    pub async fn start_tracking(&self, technician_id: &str, booking_id: &str) -> anyhow::Result<()> {
        self.store.set_status(technician_id, PresenceStatus::Moving);
        self.directory.set_status(booking_id, BookingStatus::Moving).await?;

        let event = Event::new(
            EventType::TrackingStarted,
            json!({
                "technician_id": technician_id,
                "booking_id": booking_id,
            }),
        );
        self.publish_tracking(booking_id, &event);
        info!(technician_id = %technician_id, booking_id = %booking_id, "tracking_started");
        Ok(())
    }

    /// End a tracking session: the presence and its throttle state are
    /// dropped and the stop is announced.
    pub fn stop_tracking(&self, technician_id: &str, booking_id: &str) {
        self.store.clear(technician_id);

        let event = Event::new(
            EventType::TrackingStopped,
            json!({
                "technician_id": technician_id,
                "booking_id": booking_id,
                "status": "completed",
            }),
        );
        self.publish_tracking(booking_id, &event);
        info!(technician_id = %technician_id, booking_id = %booking_id, "tracking_stopped");
    }

    /// Customer(booking) and Admin receive every tracking lifecycle event
    fn publish_tracking(&self, booking_id: &str, event: &Event) {
        self.bus.publish(Audience::Admin, "", event);
        self.bus.publish(Audience::Customer, booking_id, event);
    }
}
