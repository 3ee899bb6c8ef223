use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::User;
use crate::entities::{Coordinates, DriverPresence, Ride, RideRequest, VehicleClass};
use crate::error::Error;
use crate::feed::ChangeFeed;

#[async_trait]
pub trait RideAPI {
    async fn create_ride(&self, user: User, request: RideRequest) -> Result<Ride, Error>;
    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;
    async fn open_rides(&self, user: User) -> Result<Vec<Ride>, Error>;
    async fn claim_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;
    async fn mark_arrived(&self, user: User, id: Uuid) -> Result<Ride, Error>;
    async fn start_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;
    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error>;
    async fn cancel_ride(&self, user: User, id: Uuid, reason: Option<String>)
        -> Result<Ride, Error>;
}

#[async_trait]
pub trait PresenceAPI {
    async fn go_online(
        &self,
        user: User,
        coordinates: Coordinates,
        vehicle: VehicleClass,
    ) -> Result<DriverPresence, Error>;
    async fn go_offline(&self, user: User) -> Result<DriverPresence, Error>;
    async fn report_location(&self, user: User, coordinates: Coordinates) -> Result<(), Error>;
    async fn nearby_drivers(
        &self,
        user: User,
        center: Coordinates,
        radius: f64,
    ) -> Result<Vec<DriverPresence>, Error>;
}

pub trait API: RideAPI + PresenceAPI {
    fn feed(&self) -> &ChangeFeed;
}

pub type DynAPI = Arc<dyn API + Send + Sync>;
