use async_trait::async_trait;
use chrono::Duration;

use super::{Engine, PRESENCE_MAX_AGE_SECS};

use crate::api::PresenceAPI;
use crate::auth::User;
use crate::entities::{Coordinates, DriverPresence, VehicleClass};
use crate::error::{invalid_input_error, invalid_transition_error, Error};

#[async_trait]
impl PresenceAPI for Engine {
    #[tracing::instrument(skip(self))]
    async fn go_online(
        &self,
        user: User,
        coordinates: Coordinates,
        vehicle: VehicleClass,
    ) -> Result<DriverPresence, Error> {
        if !coordinates.is_valid() {
            return Err(invalid_input_error());
        }

        let mut presence = self
            .store
            .fetch_presence(user.id)
            .await?
            .unwrap_or_else(|| DriverPresence::new(user.id, vehicle));

        presence.go_online(coordinates, vehicle);

        self.store.upsert_presence(&presence).await?;
        self.feed.publish_presence(&presence);

        Ok(presence)
    }

    /// Going offline clears dispatch visibility only; a ride the driver is
    /// bound to stays bound and is not reassigned.
    #[tracing::instrument(skip(self))]
    async fn go_offline(&self, user: User) -> Result<DriverPresence, Error> {
        let mut presence = self
            .store
            .fetch_presence(user.id)
            .await?
            .ok_or_else(invalid_input_error)?;

        presence.go_offline()?;

        self.store.upsert_presence(&presence).await?;
        self.feed.publish_presence(&presence);

        Ok(presence)
    }

    #[tracing::instrument(skip(self))]
    async fn report_location(&self, user: User, coordinates: Coordinates) -> Result<(), Error> {
        if !coordinates.is_valid() {
            return Err(invalid_input_error());
        }

        let mut presence = self
            .store
            .fetch_presence(user.id)
            .await?
            .ok_or_else(invalid_transition_error)?;

        presence.report(coordinates)?;

        self.store.upsert_presence(&presence).await?;
        self.feed.publish_presence(&presence);

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn nearby_drivers(
        &self,
        _user: User,
        center: Coordinates,
        radius: f64,
    ) -> Result<Vec<DriverPresence>, Error> {
        if !center.is_valid() || !radius.is_finite() || radius <= 0.0 {
            return Err(invalid_input_error());
        }

        self.store
            .nearby_drivers(center, radius, Duration::seconds(PRESENCE_MAX_AGE_SECS))
            .await
    }
}
