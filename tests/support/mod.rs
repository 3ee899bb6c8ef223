#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use kenda_dispatch::api::{PresenceAPI, RideAPI};
use kenda_dispatch::auth::User;
use kenda_dispatch::engine::Engine;
use kenda_dispatch::entities::{Coordinates, Place, Ride, RideRequest, VehicleClass};
use kenda_dispatch::store::MemoryStore;

pub const PICKUP: Coordinates = Coordinates {
    latitude: -1.6585,
    longitude: 29.2205,
};

// ~5 km north of the pickup
pub const DESTINATION: Coordinates = Coordinates {
    latitude: -1.6135,
    longitude: 29.2205,
};

pub fn engine() -> (Arc<Engine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(Engine::new(store.clone()));

    (engine, store)
}

pub fn passenger() -> User {
    User::new(Uuid::new_v4())
}

pub async fn online_driver(engine: &Engine) -> User {
    let driver = User::new(Uuid::new_v4());

    engine
        .go_online(driver.clone(), PICKUP, VehicleClass::Moto)
        .await
        .unwrap();

    driver
}

pub fn goma_request(driver_id: Option<Uuid>) -> RideRequest {
    RideRequest {
        pickup: Place {
            coordinates: PICKUP,
            address: "Boulevard Kanyamuhanga, Goma".into(),
        },
        destination: Place {
            coordinates: DESTINATION,
            address: "Aéroport international de Goma".into(),
        },
        price: 4500.0,
        distance: 5000.0,
        duration: 900.0,
        driver_id,
    }
}

/// Create a ride and drive it to `in_progress`.
pub async fn ride_in_progress(engine: &Engine) -> (User, User, Ride) {
    let passenger = passenger();
    let driver = online_driver(engine).await;

    let ride = engine
        .create_ride(passenger.clone(), goma_request(None))
        .await
        .unwrap();

    engine.claim_ride(driver.clone(), ride.id).await.unwrap();
    engine.mark_arrived(driver.clone(), ride.id).await.unwrap();
    let ride = engine.start_ride(driver.clone(), ride.id).await.unwrap();

    (passenger, driver, ride)
}
