use chrono::{DateTime, FixedOffset};

/// Mean earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A single geolocation sample.
#[derive(Clone, Debug, PartialEq)]
pub struct GeoPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(timestamp: DateTime<FixedOffset>, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp,
            latitude,
            longitude,
        }
    }
}

/// Great-circle distance between two points in kilometres (haversine).
#[must_use]
pub fn haversine_km(start: &GeoPoint, end: &GeoPoint) -> f64 {
    let lat1 = start.latitude.to_radians();
    let lat2 = end.latitude.to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (end.longitude - start.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Length of a trace: the sum of the distances between consecutive points,
/// in arrival order. Fewer than two points yield zero.
#[must_use]
pub fn trace_distance_km(points: &[GeoPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_km(&pair[0], &pair[1]))
        .sum()
}
