use serde::{Deserialize, Serialize};

/// Mean Earth radius (IUGG), in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters (haversine on a spherical Earth).
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let phi1 = self.lat.to_radians();
        let phi2 = other.lat.to_radians();
        let d_phi = (other.lat - self.lat).to_radians();
        let d_lambda = (other.lng - self.lng).to_radians();

        let a = (d_phi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_METERS * c
    }
}

#[cfg(test)]
impl GeoPoint {
    /// Point `meters` due north of `self`.
    pub fn offset_north(&self, meters: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (meters / EARTH_RADIUS_METERS).to_degrees(),
            lng: self.lng,
        }
    }

    /// Point `meters` due east of `self`, along the parallel.
    pub fn offset_east(&self, meters: f64) -> GeoPoint {
        let radius_at_lat = EARTH_RADIUS_METERS * self.lat.to_radians().cos();
        GeoPoint {
            lat: self.lat,
            lng: self.lng + (meters / radius_at_lat).to_degrees(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Chania town hall
    const ORIGIN: GeoPoint = GeoPoint {
        lat: 35.5138,
        lng: 24.0180,
    };

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(ORIGIN.distance_meters(&ORIGIN), 0.0);
    }

    #[test]
    fn test_north_offset_distance() {
        let d = ORIGIN.distance_meters(&ORIGIN.offset_north(200.0));
        assert!((d - 200.0).abs() < 0.01, "distance was {d}");
    }

    #[test]
    fn test_one_degree_on_equator() {
        let d = GeoPoint::new(0.0, 0.0).distance_meters(&GeoPoint::new(0.0, 1.0));
        assert!((d - 111_195.0).abs() < 1.0, "distance was {d}");
    }

    #[test]
    fn test_longitude_degrees_shrink_with_latitude() {
        // Treating degrees as planar would call these equal; at 60N a degree of
        // longitude spans half the ground distance of one at the equator.
        let equator = GeoPoint::new(0.0, 0.0).distance_meters(&GeoPoint::new(0.0, 1.0));
        let north = GeoPoint::new(60.0, 0.0).distance_meters(&GeoPoint::new(60.0, 1.0));
        assert!((north / equator - 0.5).abs() < 0.001, "ratio was {}", north / equator);
    }

    #[test]
    fn test_east_offset_distance() {
        let d = ORIGIN.distance_meters(&ORIGIN.offset_east(800.0));
        assert!((d - 800.0).abs() < 0.5, "distance was {d}");
    }
}
