use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Coordinates;
use crate::error::{invalid_transition_error, Error};

/// A driver's live dispatch-relevant state. One row per driver account,
/// upserted for the lifetime of the account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverPresence {
    pub driver_id: Uuid,
    pub online: bool,
    pub position: Option<Coordinates>,
    pub updated_at: DateTime<Utc>,
    pub vehicle: VehicleClass,
    pub rating: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleClass {
    Car,
    Moto,
}

impl VehicleClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Car => "car",
            Self::Moto => "moto",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "car" => Some(Self::Car),
            "moto" => Some(Self::Moto),
            _ => None,
        }
    }
}

impl DriverPresence {
    pub fn new(driver_id: Uuid, vehicle: VehicleClass) -> Self {
        Self {
            driver_id,
            online: false,
            position: None,
            updated_at: Utc::now(),
            vehicle,
            rating: 5.0,
        }
    }

    /// The position is only trusted while the driver is online and the
    /// last report is recent; the store keeps no TTL of its own.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.online && Utc::now() - self.updated_at <= max_age
    }

    /// Going online always refreshes position and vehicle; repeating the
    /// toggle is the driver's first location report, not an error.
    #[tracing::instrument]
    pub fn go_online(&mut self, coordinates: Coordinates, vehicle: VehicleClass) {
        self.online = true;
        self.position = Some(coordinates);
        self.vehicle = vehicle;
        self.updated_at = Utc::now();
    }

    #[tracing::instrument]
    pub fn go_offline(&mut self) -> Result<(), Error> {
        match self.online {
            true => {
                self.online = false;
                self.updated_at = Utc::now();

                Ok(())
            }
            false => Err(invalid_transition_error()),
        }
    }

    #[tracing::instrument]
    pub fn report(&mut self, coordinates: Coordinates) -> Result<(), Error> {
        match self.online {
            true => {
                self.position = Some(coordinates);
                self.updated_at = Utc::now();

                Ok(())
            }
            false => Err(invalid_transition_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOMA: Coordinates = Coordinates {
        latitude: -1.6585,
        longitude: 29.2205,
    };

    #[test]
    fn offline_driver_cannot_report() {
        let mut presence = DriverPresence::new(Uuid::new_v4(), VehicleClass::Moto);

        assert!(presence.report(GOMA).unwrap_err().is_invalid_transition());
        assert!(presence.position.is_none());
    }

    #[test]
    fn going_offline_twice_is_rejected() {
        let mut presence = DriverPresence::new(Uuid::new_v4(), VehicleClass::Car);

        presence.go_online(GOMA, VehicleClass::Car);
        presence.go_offline().unwrap();

        assert!(presence.go_offline().unwrap_err().is_invalid_transition());
    }

    #[test]
    fn offline_presence_is_never_fresh() {
        let mut presence = DriverPresence::new(Uuid::new_v4(), VehicleClass::Moto);

        presence.go_online(GOMA, VehicleClass::Moto);
        assert!(presence.is_fresh(Duration::seconds(60)));

        presence.go_offline().unwrap();
        assert!(!presence.is_fresh(Duration::seconds(60)));
    }
}
