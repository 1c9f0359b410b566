//! Spherical geodesy (haversine family)

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Both coordinates finite and inside their valid ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_m(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        self.distance_m(other) / 1000.0
    }

    pub fn bearing_to(&self, other: &GeoPoint) -> f64 {
        initial_bearing(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> GeoPoint {
        let (lat, lon) = destination_point(self.latitude, self.longitude, bearing_deg, distance_m);
        GeoPoint::new(lat, lon)
    }
}

/// Great-circle distance in meters
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle distance in km
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_m(lat1, lon1, lat2, lon2) / 1000.0
}

/// Initial bearing of the great circle from point 1 to point 2, in [0, 360)
pub fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let x = dlon.sin() * lat2_rad.cos();
    let y = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();

    normalize_bearing(x.atan2(y).to_degrees())
}

/// Forward geodesic: point reached from (lat, lon) along `bearing_deg` after `distance_m`
pub fn destination_point(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let brg = bearing_deg.to_radians();
    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let delta = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * brg.cos()).asin();
    let lon2 = lon1
        + (brg.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    (lat2.to_degrees(), normalize_longitude(lon2.to_degrees()))
}

/// Wrap a bearing into [0, 360)
pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let b = bearing_deg.rem_euclid(360.0);
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 540.0).rem_euclid(360.0) - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_haversine() {
        // Brasilia to Sao Paulo: ~873 km
        let dist = haversine_km(-15.7939, -47.8828, -23.5505, -46.6333);
        assert!((dist - 873.0).abs() < 10.0, "distance: {}", dist);

        let dist = haversine_km(-15.9, -47.1, -15.9, -47.1);
        assert!(dist.abs() < 1e-9);
    }

    #[test]
    fn test_initial_bearing_cardinal() {
        assert!((initial_bearing(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((initial_bearing(0.0, 0.0, 0.0, -1.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_destination_one_degree_north() {
        // One degree of arc on the mean sphere
        let arc_m = EARTH_RADIUS_M * 1.0_f64.to_radians();
        let (lat, lon) = destination_point(-15.9, -47.1, 0.0, arc_m);
        assert!((lat - -14.9).abs() < 1e-9);
        assert!((lon - -47.1).abs() < 1e-9);
    }

    #[test]
    fn test_destination_crosses_antimeridian() {
        let (_, lon) = destination_point(0.0, 179.9, 90.0, 50_000.0);
        assert!(lon < -179.0 && lon >= -180.0, "lon: {}", lon);
    }

    proptest! {
        // Walking out and measuring back agrees with the requested distance
        #[test]
        fn destination_distance_consistent(
            lat in -60.0f64..60.0,
            lon in -170.0f64..170.0,
            bearing in 0.0f64..360.0,
            dist in 100.0f64..300_000.0,
        ) {
            let (lat2, lon2) = destination_point(lat, lon, bearing, dist);
            let back = haversine_m(lat, lon, lat2, lon2);
            prop_assert!((back - dist).abs() < 0.01, "{} vs {}", back, dist);
        }
    }
}
