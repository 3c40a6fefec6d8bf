//! Services - tracking business logic and shared state
//!
//! This module contains the core tracking logic:
//! - `geo` - Great-circle distance and geofence arrival math
//! - `location_store` - Throttled per-technician position cache
//! - `ingest` - Ingest coordination and event fan-out
//! - `booking` - Booking store collaborator interface

pub mod booking;
pub mod geo;
pub mod ingest;
pub mod location_store;

// Re-export commonly used types
pub use booking::{BookingDirectory, BookingRoute, Destination, InMemoryBookingDirectory};
pub use ingest::{IngestError, IngestOutcome, LocationIngestCoordinator};
pub use location_store::LocationStore;
