use axum::extract::{Extension, Json, Query};
use serde::{Deserialize, Serialize};

use crate::api::{DynAPI, PresenceAPI};
use crate::auth::User;
use crate::entities::{Coordinates, DriverPresence, VehicleClass};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct OnlineParams {
    coordinates: Coordinates,
    vehicle: VehicleClass,
}

#[derive(Serialize, Deserialize)]
pub struct LocationParams {
    coordinates: Coordinates,
}

#[derive(Serialize, Deserialize)]
pub struct NearbyParams {
    latitude: f64,
    longitude: f64,
    radius: f64,
}

pub async fn online(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<OnlineParams>,
) -> Result<Json<DriverPresence>, Error> {
    let presence = api
        .go_online(user, params.coordinates, params.vehicle)
        .await?;

    Ok(presence.into())
}

pub async fn offline(
    Extension(api): Extension<DynAPI>,
    user: User,
) -> Result<Json<DriverPresence>, Error> {
    let presence = api.go_offline(user).await?;

    Ok(presence.into())
}

pub async fn location(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<LocationParams>,
) -> Result<Json<()>, Error> {
    api.report_location(user, params.coordinates).await?;

    Ok(().into())
}

pub async fn nearby(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<NearbyParams>,
) -> Result<Json<Vec<DriverPresence>>, Error> {
    let center = Coordinates {
        latitude: params.latitude,
        longitude: params.longitude,
    };

    let drivers = api.nearby_drivers(user, center, params.radius).await?;

    Ok(drivers.into())
}
