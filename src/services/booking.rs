//! Booking store collaborator interface
//!
//! The tracking core needs exactly two capabilities from the booking
//! store: resolve a booking's destination and current workflow status,
//! and mutate that status. Both are behind a trait so the persistence
//! layer stays out of this crate; callers must treat either as unreliable.

use crate::domain::BookingStatus;
use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Destination and observed workflow status for one booking
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRoute {
    /// Destination coordinates; `None` when the booking has no usable
    /// geocode, which disables distance and arrival evaluation
    pub destination: Option<Destination>,
    pub status: BookingStatus,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Destination {
    pub latitude: f64,
    pub longitude: f64,
}

#[async_trait]
pub trait BookingDirectory: Send + Sync {
    /// Resolve destination coordinates and current workflow status
    async fn lookup(&self, booking_id: &str) -> anyhow::Result<BookingRoute>;

    /// Persist a workflow status change
    async fn set_status(&self, booking_id: &str, status: BookingStatus) -> anyhow::Result<()>;
}

/// In-memory directory backing the binary and the tests.
///
/// Production deployments put the real booking store behind
/// `BookingDirectory` instead.
#[derive(Default)]
pub struct InMemoryBookingDirectory {
    routes: RwLock<FxHashMap<String, BookingRoute>>,
}

impl InMemoryBookingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, booking_id: &str, route: BookingRoute) {
        self.routes.write().insert(booking_id.to_string(), route);
    }
}

#[async_trait]
impl BookingDirectory for InMemoryBookingDirectory {
    async fn lookup(&self, booking_id: &str) -> anyhow::Result<BookingRoute> {
        self.routes
            .read()
            .get(booking_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("booking not found: {booking_id}"))
    }

    async fn set_status(&self, booking_id: &str, status: BookingStatus) -> anyhow::Result<()> {
        let mut routes = self.routes.write();
        let route = routes
            .get_mut(booking_id)
            .ok_or_else(|| anyhow::anyhow!("booking not found: {booking_id}"))?;
        route.status = status;
        Ok(())
    }
}
