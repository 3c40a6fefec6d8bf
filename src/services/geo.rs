//! Great-circle distance and geofence arrival math
//!
//! Pure functions, no I/O. Distances use the Haversine formula, which is
//! accurate to well under a meter at geofence scale.

/// Mean Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters
pub fn distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether a distance counts as arrived at the geofence.
///
/// Strictly less than: sitting exactly on the radius is not arrived.
pub fn arrived(distance_m: f64, radius_m: f64) -> bool {
    distance_m < radius_m
}
