use async_trait::async_trait;
use uuid::Uuid;

use super::Engine;

use crate::api::RideAPI;
use crate::auth::User;
use crate::entities::{Ride, RideRequest};
use crate::error::{
    invalid_input_error, invalid_transition_error, ride_taken_error, unauthorized_error, Error,
};

#[async_trait]
impl RideAPI for Engine {
    #[tracing::instrument(skip(self, request))]
    async fn create_ride(&self, user: User, request: RideRequest) -> Result<Ride, Error> {
        let ride = Ride::request(user.id, request)?;

        self.store.insert_ride(&ride).await?;
        self.feed.publish_ride(&ride);

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let ride = self
            .store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        let is_party = user.id == ride.passenger_id || ride.driver_id == Some(user.id);

        if !is_party && !ride.visible_to(user.id) {
            return Err(unauthorized_error());
        }

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn open_rides(&self, user: User) -> Result<Vec<Ride>, Error> {
        self.store.open_rides(user.id).await
    }

    #[tracing::instrument(skip(self))]
    async fn claim_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let presence = self
            .store
            .fetch_presence(user.id)
            .await?
            .ok_or_else(invalid_transition_error)?;

        if !presence.online {
            return Err(invalid_transition_error());
        }

        match self.store.claim_ride(id, user.id).await? {
            Some(ride) => {
                tracing::info!(ride_id = %ride.id, driver_id = %user.id, "ride claimed");

                self.feed.publish_ride(&ride);

                Ok(ride)
            }
            // zero rows: classify, but never replay the write. The caller
            // refreshes its view of open rides instead.
            None => {
                let ride = self
                    .store
                    .fetch_ride(id)
                    .await?
                    .ok_or_else(invalid_input_error)?;

                if !ride.is_searching() || !ride.visible_to(user.id) {
                    return Err(ride_taken_error());
                }

                if self.store.active_ride_for_driver(user.id).await?.is_some() {
                    return Err(invalid_transition_error());
                }

                Err(ride_taken_error())
            }
        }
    }

    #[tracing::instrument(skip(self))]
    async fn mark_arrived(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let mut ride = self
            .store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        if !ride.is_bound_driver(user.id) {
            return Err(unauthorized_error());
        }

        let prior = ride.status.name();
        ride.arrive()?;

        if !self.store.update_ride(&ride, prior).await? {
            return Err(invalid_transition_error());
        }

        self.feed.publish_ride(&ride);

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn start_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let mut ride = self
            .store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        if !ride.is_bound_driver(user.id) {
            return Err(unauthorized_error());
        }

        let prior = ride.status.name();
        ride.start()?;

        if !self.store.update_ride(&ride, prior).await? {
            return Err(invalid_transition_error());
        }

        self.feed.publish_ride(&ride);

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_ride(&self, user: User, id: Uuid) -> Result<Ride, Error> {
        let mut ride = self
            .store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        if !ride.is_bound_driver(user.id) {
            return Err(unauthorized_error());
        }

        let prior = ride.status.name();
        ride.complete()?;

        if !self.store.update_ride(&ride, prior).await? {
            return Err(invalid_transition_error());
        }

        tracing::info!(ride_id = %ride.id, "ride completed");

        self.feed.publish_ride(&ride);

        Ok(ride)
    }

    #[tracing::instrument(skip(self))]
    async fn cancel_ride(
        &self,
        user: User,
        id: Uuid,
        reason: Option<String>,
    ) -> Result<Ride, Error> {
        let mut ride = self
            .store
            .fetch_ride(id)
            .await?
            .ok_or_else(invalid_input_error)?;

        let is_passenger = user.id == ride.passenger_id;

        if !is_passenger && !ride.is_bound_driver(user.id) {
            return Err(unauthorized_error());
        }

        let prior = ride.status.name();
        ride.cancel(reason)?;

        if !self.store.update_ride(&ride, prior).await? {
            return Err(invalid_transition_error());
        }

        self.feed.publish_ride(&ride);

        Ok(ride)
    }
}
