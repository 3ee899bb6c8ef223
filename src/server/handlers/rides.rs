use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Extension, Json, Path};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, RideAPI, API};
use crate::auth::User;
use crate::config::Config;
use crate::entities::{Place, Ride, RideRequest};
use crate::error::Error;
use crate::external::routing;
use crate::feed::FeedMessage;

#[derive(Serialize, Deserialize)]
pub struct CreateParams {
    pickup: Place,
    destination: Place,
    price: Option<f64>,
    distance: Option<f64>,
    duration: Option<f64>,
    driver_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize)]
pub struct CancelParams {
    reason: Option<String>,
}

#[axum_macros::debug_handler]
pub async fn create(
    Extension(api): Extension<DynAPI>,
    Extension(config): Extension<Arc<Config>>,
    user: User,
    Json(params): Json<CreateParams>,
) -> Result<Json<Ride>, Error> {
    let request = match (params.price, params.distance, params.duration) {
        (Some(price), Some(distance), Some(duration)) => RideRequest {
            pickup: params.pickup,
            destination: params.destination,
            price,
            distance,
            duration,
            driver_id: params.driver_id,
        },
        _ => {
            let estimate = routing::estimate_or_fallback(
                &config,
                params.pickup.coordinates,
                params.destination.coordinates,
            )
            .await;

            RideRequest {
                pickup: params.pickup,
                destination: params.destination,
                price: params.price.unwrap_or_else(|| config.fare(estimate.distance)),
                distance: params.distance.unwrap_or(estimate.distance),
                duration: params.duration.unwrap_or(estimate.duration),
                driver_id: params.driver_id,
            }
        }
    };

    let ride = api.create_ride(user, request).await?;

    Ok(ride.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.find_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn open(Extension(api): Extension<DynAPI>, user: User) -> Result<Json<Vec<Ride>>, Error> {
    let rides = api.open_rides(user).await?;

    Ok(rides.into())
}

pub async fn claim(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.claim_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn arrive(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.mark_arrived(user, id).await?;

    Ok(ride.into())
}

pub async fn start(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.start_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn complete(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, Error> {
    let ride = api.complete_ride(user, id).await?;

    Ok(ride.into())
}

pub async fn cancel(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<CancelParams>,
) -> Result<Json<Ride>, Error> {
    let ride = api.cancel_ride(user, id, params.reason).await?;

    Ok(ride.into())
}

/// Server-sent stream of one ride's updates: the current row first, then
/// every change pushed by the feed. A `lapse` event tells the client its
/// view may have gaps and it should re-fetch.
pub async fn events(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Error> {
    let subscription = api.feed().subscribe_ride(id);
    let snapshot = api.find_ride(user, id).await?;

    let updates = futures::stream::unfold(subscription, |mut subscription| async move {
        match subscription.recv().await {
            Some(FeedMessage::Event(ride)) => Some((ride_event(&ride), subscription)),
            Some(FeedMessage::Lapse(skipped)) => Some((lapse_event(skipped), subscription)),
            None => None,
        }
    });

    let stream = futures::stream::iter([ride_event(&snapshot)])
        .chain(updates)
        .map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn ride_event(ride: &Ride) -> Event {
    match serde_json::to_string(ride) {
        Ok(data) => Event::default().event("ride").data(data),
        Err(_) => lapse_event(0),
    }
}

fn lapse_event(skipped: u64) -> Event {
    Event::default().event("lapse").data(skipped.to_string())
}
