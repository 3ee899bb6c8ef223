use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::Place;
use crate::error::{invalid_input_error, invalid_transition_error, ride_taken_error, Error};

/// A single transport request and its full lifecycle record. Rides are
/// never deleted; terminal rows stay behind as the archive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub status: RideStatus,
    pub passenger_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub pickup: Place,
    pub destination: Place,
    /// Agreed fare in Congolese francs.
    pub price: f64,
    /// Route distance in meters.
    pub distance: f64,
    /// Estimated trip duration in seconds.
    pub duration: f64,
    pub requested_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Searching,
    Accepted,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    /// Stable wire name, also used as the store's status column value.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::Accepted => "accepted",
            Self::Arrived => "arrived",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "searching" => Some(Self::Searching),
            "accepted" => Some(Self::Accepted),
            "arrived" => Some(Self::Arrived),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RideRequest {
    pub pickup: Place,
    pub destination: Place,
    pub price: f64,
    pub distance: f64,
    pub duration: f64,
    /// Set for a targeted request aimed at one specific driver.
    pub driver_id: Option<Uuid>,
}

impl Ride {
    pub fn request(passenger_id: Uuid, request: RideRequest) -> Result<Self, Error> {
        if !request.pickup.is_valid() || !request.destination.is_valid() {
            return Err(invalid_input_error());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            status: RideStatus::Searching,
            passenger_id,
            driver_id: request.driver_id,
            pickup: request.pickup,
            destination: request.destination,
            price: request.price,
            distance: request.distance,
            duration: request.duration,
            requested_at: Utc::now(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        })
    }

    pub fn is_searching(&self) -> bool {
        matches!(self.status, RideStatus::Searching)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Dispatch visibility: open to every driver unless the request
    /// targets one specific driver.
    pub fn visible_to(&self, driver_id: Uuid) -> bool {
        match self.status {
            RideStatus::Searching => self.driver_id.map_or(true, |target| target == driver_id),
            _ => false,
        }
    }

    /// A driver counts as bound only once the claim has landed; a targeted
    /// request carries driver_id while still open.
    pub fn is_bound_driver(&self, user_id: Uuid) -> bool {
        !self.is_searching() && self.driver_id == Some(user_id)
    }

    #[tracing::instrument]
    pub fn claim(&mut self, driver_id: Uuid) -> Result<(), Error> {
        match self.status {
            RideStatus::Searching => {
                if let Some(target) = self.driver_id {
                    if target != driver_id {
                        return Err(ride_taken_error());
                    }
                }

                self.driver_id = Some(driver_id);
                self.status = RideStatus::Accepted;
                self.accepted_at = Some(Utc::now());

                Ok(())
            }
            _ => Err(ride_taken_error()),
        }
    }

    #[tracing::instrument]
    pub fn arrive(&mut self) -> Result<(), Error> {
        match self.status {
            RideStatus::Accepted => {
                self.status = RideStatus::Arrived;

                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    #[tracing::instrument]
    pub fn start(&mut self) -> Result<(), Error> {
        match self.status {
            RideStatus::Arrived => {
                self.status = RideStatus::InProgress;
                self.started_at = Some(Utc::now());

                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    #[tracing::instrument]
    pub fn complete(&mut self) -> Result<(), Error> {
        match self.status {
            RideStatus::InProgress => {
                self.status = RideStatus::Completed;
                self.completed_at = Some(Utc::now());

                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }

    /// Cancellation is offered pre-trip only; once the trip is running the
    /// ride can only complete.
    #[tracing::instrument]
    pub fn cancel(&mut self, reason: Option<String>) -> Result<(), Error> {
        match self.status {
            RideStatus::Searching | RideStatus::Accepted | RideStatus::Arrived => {
                self.status = RideStatus::Cancelled;
                self.cancelled_at = Some(Utc::now());
                self.cancel_reason = reason;

                Ok(())
            }
            _ => Err(invalid_transition_error()),
        }
    }
}
