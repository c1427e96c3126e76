//! Small value types shared by every subsystem.

use serde::{Deserialize, Serialize};

/// A validated WGS84 point. Constructed only through [`Coordinate::new`], so
/// any `Coordinate` in scope already satisfies `lat ∈ [-90, 90]`,
/// `lng ∈ [-180, 180]` (§4.1 ingest path validation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, crate::CoreError> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(crate::CoreError::bad_request(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(crate::CoreError::bad_request(format!(
                "longitude {lng} out of range [-180, 180]"
            )));
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance in kilometres, earth radius 6371 km, rounded to
    /// two decimal places (§4.1 Haversine spec).
    pub fn haversine_km(&self, other: &Coordinate) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        let distance = EARTH_RADIUS_KM * c;
        (distance * 100.0).round() / 100.0
    }
}

/// ETA at a fixed 40 km/h city constant, rounded to whole minutes (§4.1).
pub fn eta_minutes(distance_km: f64) -> i64 {
    (distance_km / 40.0 * 60.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_points_have_zero_distance() {
        let a = Coordinate::new(40.7128, -74.0060).unwrap();
        assert_eq!(a.haversine_km(&a), 0.0);
    }

    #[test]
    fn eta_of_zero_distance_is_zero_minutes() {
        assert_eq!(eta_minutes(0.0), 0);
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_longitude() {
        assert!(Coordinate::new(0.0, -181.0).is_err());
    }
}
