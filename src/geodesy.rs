//! Great-circle and 3D distances between fixes.

use crate::sensors::PositionSample;

/// Mean Earth radius (m)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters
pub fn horizontal_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Distance between two fixes, including the altitude change when both carry one
pub fn distance_3d(a: &PositionSample, b: &PositionSample) -> f64 {
    let horizontal = horizontal_distance(a.latitude, a.longitude, b.latitude, b.longitude);
    match (a.altitude, b.altitude) {
        (Some(alt_a), Some(alt_b)) => {
            let d_alt = alt_b - alt_a;
            (horizontal * horizontal + d_alt * d_alt).sqrt()
        }
        _ => horizontal,
    }
}
