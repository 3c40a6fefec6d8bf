//! Concurrent per-technician position cache with update throttling
//!
//! Every inbound report overwrites the stored position so `get` is never
//! stale, but only reports spaced at least the throttle window apart are
//! "accepted" - the caller's cue to broadcast and evaluate the geofence.
//! This keeps a device posting GPS fixes several times a second from
//! flooding the bus.

use crate::domain::{epoch_ms, LocationReport, PresenceStatus, TechPresence};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// In-memory presence cache shared across request tasks.
///
/// Positions and throttle timestamps live behind independent locks. A
/// torn read between the two is tolerated: this is advisory telemetry,
/// not a source of truth.
pub struct LocationStore {
    presences: RwLock<FxHashMap<String, TechPresence>>,
    last_accepted_ms: RwLock<FxHashMap<String, u64>>,
    throttle_ms: u64,
}

impl LocationStore {
    pub fn new(throttle_ms: u64) -> Self {
        Self {
            presences: RwLock::new(FxHashMap::default()),
            last_accepted_ms: RwLock::new(FxHashMap::default()),
            throttle_ms,
        }
    }

    /// Apply a position report.
    ///
    /// Always overwrites position, booking and last-update for the
    /// technician. Returns `(accepted, snapshot)` where `accepted` is
    /// true iff the throttle window has elapsed since the last accepted
    /// report; only then should the caller broadcast or check geofences.
    pub fn update(&self, report: &LocationReport) -> (bool, TechPresence) {
        let now = epoch_ms();

        let last = {
            let last_accepted = self.last_accepted_ms.read();
            last_accepted.get(&report.technician_id).copied().unwrap_or(0)
        };
        let accepted = now.saturating_sub(last) >= self.throttle_ms;

        let snapshot = {
            let mut presences = self.presences.write();
            let presence = presences
                .entry(report.technician_id.clone())
                .or_insert_with(|| TechPresence::new(&report.technician_id));

            presence.booking_id = report.booking_id.clone();
            presence.latitude = report.latitude;
            presence.longitude = report.longitude;
            presence.accuracy = report.accuracy;
            presence.speed = report.speed;
            presence.heading = report.heading;
            presence.last_update_ms = now;

            presence.clone()
        };

        if accepted {
            self.last_accepted_ms.write().insert(report.technician_id.clone(), now);
        }

        (accepted, snapshot)
    }

    pub fn get(&self, technician_id: &str) -> Option<TechPresence> {
        self.presences.read().get(technician_id).cloned()
    }

    /// All technicians currently out on a job: non-idle status and a
    /// non-empty booking
    pub fn list_active(&self) -> Vec<TechPresence> {
        self.presences
            .read()
            .values()
            .filter(|p| p.status != PresenceStatus::Idle && !p.booking_id.is_empty())
            .cloned()
            .collect()
    }

    pub fn list_by_booking(&self, booking_id: &str) -> Vec<TechPresence> {
        self.presences
            .read()
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect()
    }

    /// Status changes are independent of position mutation; a missing
    /// presence is a no-op.
    pub fn set_status(&self, technician_id: &str, status: PresenceStatus) {
        if let Some(presence) = self.presences.write().get_mut(technician_id) {
            presence.status = status;
        }
    }

    /// Cache the last computed distance to the destination
    pub fn set_distance(&self, technician_id: &str, distance_m: f64) {
        if let Some(presence) = self.presences.write().get_mut(technician_id) {
            presence.distance_m = Some(distance_m);
        }
    }

    /// End of tracking session: drop the presence and its throttle state
    pub fn clear(&self, technician_id: &str) {
        self.presences.write().remove(technician_id);
        self.last_accepted_ms.write().remove(technician_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(tech: &str, lat: f64, lng: f64) -> LocationReport {
        LocationReport {
            technician_id: tech.to_string(),
            booking_id: "booking-1".to_string(),
            latitude: lat,
            longitude: lng,
            accuracy: 10.0,
            speed: 4.2,
            heading: 180.0,
        }
    }

    #[test]
    fn test_first_update_is_accepted() {
        let store = LocationStore::new(2000);
        let (accepted, snapshot) = store.update(&report("t1", 21.0, 105.8));
        assert!(accepted);
        assert_eq!(snapshot.latitude, 21.0);
        assert_eq!(snapshot.booking_id, "booking-1");
    }

    #[test]
    fn test_rapid_second_update_is_throttled_but_position_fresh() {
        let store = LocationStore::new(2000);
        let (first, _) = store.update(&report("t1", 21.0, 105.8));
        let (second, _) = store.update(&report("t1", 21.5, 106.0));

        assert!(first);
        assert!(!second);

        // Throttled or not, get reflects the most recent coordinates
        let presence = store.get("t1").unwrap();
        assert_eq!(presence.latitude, 21.5);
        assert_eq!(presence.longitude, 106.0);
    }

    #[test]
    fn test_update_accepted_after_window_elapses() {
        let store = LocationStore::new(30);
        let (first, _) = store.update(&report("t1", 21.0, 105.8));
        assert!(first);

        std::thread::sleep(Duration::from_millis(40));
        let (second, _) = store.update(&report("t1", 21.1, 105.9));
        assert!(second);
    }

    #[test]
    fn test_throttle_window_not_extended_by_rejected_updates() {
        let store = LocationStore::new(50);
        store.update(&report("t1", 21.0, 105.8));

        // A burst of throttled updates must not push the window forward
        std::thread::sleep(Duration::from_millis(30));
        let (mid, _) = store.update(&report("t1", 21.1, 105.8));
        assert!(!mid);

        std::thread::sleep(Duration::from_millis(30));
        let (after, _) = store.update(&report("t1", 21.2, 105.8));
        assert!(after);
    }

    #[test]
    fn test_throttling_is_per_technician() {
        let store = LocationStore::new(2000);
        let (first, _) = store.update(&report("t1", 21.0, 105.8));
        let (other, _) = store.update(&report("t2", 21.0, 105.8));
        assert!(first);
        assert!(other);
    }

    #[test]
    fn test_get_unknown_technician() {
        let store = LocationStore::new(2000);
        assert!(store.get("nobody").is_none());
    }

    #[test]
    fn test_list_active_excludes_idle_and_unassigned() {
        let store = LocationStore::new(0);
        store.update(&report("idle-tech", 21.0, 105.8));
        store.update(&report("moving-tech", 21.0, 105.8));
        store.set_status("moving-tech", PresenceStatus::Moving);

        let mut unassigned = report("no-booking", 21.0, 105.8);
        unassigned.booking_id = String::new();
        store.update(&unassigned);
        store.set_status("no-booking", PresenceStatus::Working);

        let active = store.list_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].technician_id, "moving-tech");
    }

    #[test]
    fn test_list_by_booking() {
        let store = LocationStore::new(0);
        store.update(&report("t1", 21.0, 105.8));
        let mut other = report("t2", 21.0, 105.8);
        other.booking_id = "booking-2".to_string();
        store.update(&other);

        let matches = store.list_by_booking("booking-2");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].technician_id, "t2");
        assert!(store.list_by_booking("booking-3").is_empty());
    }

    #[test]
    fn test_set_status_on_missing_presence_is_noop() {
        let store = LocationStore::new(2000);
        store.set_status("ghost", PresenceStatus::Moving);
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn test_clear_resets_throttle_bookkeeping() {
        let store = LocationStore::new(2000);
        store.update(&report("t1", 21.0, 105.8));
        store.clear("t1");
        assert!(store.get("t1").is_none());

        // A fresh session starts with an accepted update
        let (accepted, _) = store.update(&report("t1", 21.0, 105.8));
        assert!(accepted);
    }

    #[test]
    fn test_set_distance_survives_throttled_update() {
        let store = LocationStore::new(2000);
        store.update(&report("t1", 21.0, 105.8));
        store.set_distance("t1", 512.5);
        store.update(&report("t1", 21.1, 105.9));

        assert_eq!(store.get("t1").unwrap().distance_m, Some(512.5));
    }
}
