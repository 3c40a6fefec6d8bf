//! End-to-end tracking flow: ingest through bus to stream session
//!
//! Exercises the full path a position report takes - throttle gate,
//! geofence evaluation, segmented fan-out - and the frames a connected
//! customer stream would observe.

use bytes::Bytes;
use fieldtrack::domain::{BookingStatus, EventType, LocationReport};
use fieldtrack::infra::{Audience, EventBus};
use fieldtrack::io::{StreamSession, LOCATION_EVENTS};
use fieldtrack::services::{
    BookingDirectory, BookingRoute, Destination, InMemoryBookingDirectory, IngestOutcome,
    LocationIngestCoordinator, LocationStore,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

const DEST_LAT: f64 = 21.0285;
const DEST_LNG: f64 = 105.8542;

struct World {
    store: Arc<LocationStore>,
    bus: Arc<EventBus>,
    directory: Arc<InMemoryBookingDirectory>,
    coordinator: LocationIngestCoordinator,
}

fn world() -> World {
    let store = Arc::new(LocationStore::new(0));
    let bus = Arc::new(EventBus::new(EventBus::DEFAULT_QUEUE_CAPACITY));
    let directory = Arc::new(InMemoryBookingDirectory::new());
    directory.upsert(
        "booking-1",
        BookingRoute {
            destination: Some(Destination { latitude: DEST_LAT, longitude: DEST_LNG }),
            status: BookingStatus::Moving,
        },
    );
    let coordinator = LocationIngestCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&directory) as Arc<dyn BookingDirectory>,
        100.0,
    );
    World { store, bus, directory, coordinator }
}

fn report(lat: f64, lng: f64) -> LocationReport {
    LocationReport {
        technician_id: "tech-1".to_string(),
        booking_id: "booking-1".to_string(),
        latitude: lat,
        longitude: lng,
        accuracy: 10.0,
        speed: 5.0,
        heading: 45.0,
    }
}

async fn next_frame(rx: &mut mpsc::Receiver<Bytes>) -> String {
    let frame = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    String::from_utf8(frame.to_vec()).unwrap()
}

#[tokio::test]
async fn test_customer_stream_sees_approach_and_arrival() {
    let w = world();

    // Connect a customer stream for booking-1
    let sub = w.bus.subscribe(Audience::Customer, "booking-1");
    let (frame_tx, mut frame_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let session =
        StreamSession::new(sub, frame_tx, Duration::from_secs(30), Some(LOCATION_EVENTS));
    let session_handle = tokio::spawn(session.run(shutdown_rx));

    let frame = next_frame(&mut frame_rx).await;
    assert!(frame.starts_with("event: connection.established\n"));

    // Far away: location frame only
    let outcome = w.coordinator.ingest(&report(21.2, 105.9)).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Accepted { arrived: false, .. }));
    let frame = next_frame(&mut frame_rx).await;
    assert!(frame.starts_with("event: location.updated\n"));

    // Inside the geofence while the booking is moving: arrival fires once
    let outcome = w.coordinator.ingest(&report(DEST_LAT + 0.0003, DEST_LNG)).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Accepted { arrived: true, .. }));
    let frame = next_frame(&mut frame_rx).await;
    assert!(frame.starts_with("event: location.updated\n"));
    let frame = next_frame(&mut frame_rx).await;
    assert!(frame.starts_with("event: geofence.arrived\n"));
    assert!(frame.contains("\"booking_id\":\"booking-1\""));

    // Booking status was persisted by the arrival edge
    let route = w.directory.lookup("booking-1").await.unwrap();
    assert_eq!(route.status, BookingStatus::Arrived);

    // Closer still: no second arrival, location frames keep flowing
    let outcome = w.coordinator.ingest(&report(DEST_LAT, DEST_LNG + 0.0001)).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Accepted { arrived: false, .. }));
    let frame = next_frame(&mut frame_rx).await;
    assert!(frame.starts_with("event: location.updated\n"));

    drop(frame_rx);
    session_handle.await.unwrap();
    assert_eq!(w.bus.stats().customer_clients, 0);
}

#[tokio::test]
async fn test_other_bookings_stream_stays_silent() {
    let w = world();

    let sub = w.bus.subscribe(Audience::Customer, "booking-other");
    let (frame_tx, mut frame_rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let session =
        StreamSession::new(sub, frame_tx, Duration::from_secs(30), Some(LOCATION_EVENTS));
    let session_handle = tokio::spawn(session.run(shutdown_rx));
    next_frame(&mut frame_rx).await; // connection.established

    w.coordinator.ingest(&report(21.2, 105.9)).await.unwrap();

    // Nothing but silence for an unrelated booking
    let outcome = timeout(Duration::from_millis(100), frame_rx.recv()).await;
    assert!(outcome.is_err());

    drop(frame_rx);
    session_handle.await.unwrap();
}

#[tokio::test]
async fn test_stop_tracking_clears_presence_and_notifies() {
    let w = world();
    w.coordinator.ingest(&report(21.2, 105.9)).await.unwrap();
    assert!(w.store.get("tech-1").is_some());

    let mut admin = w.bus.subscribe(Audience::Admin, "");
    w.coordinator.stop_tracking("tech-1", "booking-1");

    assert!(w.store.get("tech-1").is_none());
    let event = admin.recv().await.unwrap();
    assert_eq!(event.event_type, EventType::TrackingStopped);
}

#[tokio::test]
async fn test_throttled_updates_refresh_snapshot_without_frames() {
    let store = Arc::new(LocationStore::new(60_000));
    let bus = Arc::new(EventBus::new(EventBus::DEFAULT_QUEUE_CAPACITY));
    let directory = Arc::new(InMemoryBookingDirectory::new());
    directory.upsert(
        "booking-1",
        BookingRoute {
            destination: Some(Destination { latitude: DEST_LAT, longitude: DEST_LNG }),
            status: BookingStatus::Moving,
        },
    );
    let coordinator = LocationIngestCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&directory) as Arc<dyn BookingDirectory>,
        100.0,
    );

    coordinator.ingest(&report(21.2, 105.9)).await.unwrap();
    let mut admin = bus.subscribe(Audience::Admin, "");

    // Second report inside the window, even inside the geofence: no
    // broadcast, no arrival, but the snapshot is fresh
    let outcome = coordinator.ingest(&report(DEST_LAT, DEST_LNG)).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Throttled { .. }));
    assert!(admin.try_recv().is_none());

    let presence = store.get("tech-1").unwrap();
    assert_eq!(presence.latitude, DEST_LAT);
    let route = directory.lookup("booking-1").await.unwrap();
    assert_eq!(route.status, BookingStatus::Moving);
}
