use geo_types::{Geometry, Point};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS: f64 = 6_371_000.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters.
    pub fn haversine_distance(&self, other: &Coordinates) -> f64 {
        let phi_a = self.latitude.to_radians();
        let phi_b = other.latitude.to_radians();
        let delta_phi = (other.latitude - self.latitude).to_radians();
        let delta_lambda = (other.longitude - self.longitude).to_radians();

        let a = (delta_phi / 2.0).sin().powi(2)
            + phi_a.cos() * phi_b.cos() * (delta_lambda / 2.0).sin().powi(2);

        EARTH_RADIUS * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

impl From<Coordinates> for Geometry<f64> {
    fn from(coordinates: Coordinates) -> Self {
        Point::new(coordinates.longitude, coordinates.latitude).into()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub coordinates: Coordinates,
    pub address: String,
}

impl Place {
    pub fn is_valid(&self) -> bool {
        self.coordinates.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        let coordinates = Coordinates {
            latitude: -91.0,
            longitude: 29.2205,
        };

        assert!(!coordinates.is_valid());

        let coordinates = Coordinates {
            latitude: f64::NAN,
            longitude: 29.2205,
        };

        assert!(!coordinates.is_valid());
    }

    #[test]
    fn haversine_distance_matches_known_span() {
        // one degree of latitude at the equator is ~111.2 km
        let a = Coordinates {
            latitude: 0.0,
            longitude: 0.0,
        };
        let b = Coordinates {
            latitude: 1.0,
            longitude: 0.0,
        };

        let distance = a.haversine_distance(&b);

        assert!((distance - 111_195.0).abs() < 100.0);
    }
}
