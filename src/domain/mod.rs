//! Domain models - core tracking types and the event envelope
//!
//! This module contains the canonical data types used throughout the system:
//! - `TechPresence` - latest known position/status for one technician
//! - `LocationReport` - inbound position report from a device
//! - `Event` / `EventType` - telemetry events published on the bus
//! - `PresenceStatus` / `BookingStatus` - workflow status enums

pub mod event;
pub mod types;

// Re-export commonly used types at module level
pub use event::{epoch_ms, Event, EventType};
pub use types::{BookingStatus, LocationReport, PresenceStatus, TechPresence};
