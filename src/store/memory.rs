use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::RideStore;
use crate::entities::{Coordinates, DriverPresence, Ride};
use crate::error::Error;

/// In-memory store for tests and embedded setups. A single lock guards
/// both tables, so the conditional writes are as indivisible here as the
/// single-statement updates are in Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    rides: HashMap<Uuid, Ride>,
    presence: HashMap<Uuid, DriverPresence>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn driver_is_busy(&self, driver_id: Uuid, except: Uuid) -> bool {
        self.rides.values().any(|ride| {
            ride.id != except
                && ride.driver_id == Some(driver_id)
                && !ride.is_searching()
                && !ride.is_terminal()
        })
    }
}

#[async_trait]
impl RideStore for MemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        state.rides.insert(ride.id, ride.clone());

        Ok(())
    }

    async fn fetch_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let state = self.state.lock().await;

        Ok(state.rides.get(&id).cloned())
    }

    async fn claim_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Option<Ride>, Error> {
        let mut state = self.state.lock().await;

        if state.driver_is_busy(driver_id, id) {
            return Ok(None);
        }

        match state.rides.get_mut(&id) {
            Some(ride) => match ride.claim(driver_id) {
                Ok(()) => Ok(Some(ride.clone())),
                Err(_) => Ok(None),
            },
            None => Ok(None),
        }
    }

    async fn update_ride(&self, ride: &Ride, expected: &str) -> Result<bool, Error> {
        let mut state = self.state.lock().await;

        match state.rides.get_mut(&ride.id) {
            Some(current) if current.status.name() == expected => {
                *current = ride.clone();

                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_rides(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error> {
        let state = self.state.lock().await;

        let mut rides: Vec<Ride> = state
            .rides
            .values()
            .filter(|ride| ride.visible_to(driver_id))
            .cloned()
            .collect();

        rides.sort_by_key(|ride| ride.requested_at);

        Ok(rides)
    }

    async fn active_ride_for_driver(&self, driver_id: Uuid) -> Result<Option<Ride>, Error> {
        let state = self.state.lock().await;

        Ok(state
            .rides
            .values()
            .find(|ride| {
                ride.driver_id == Some(driver_id) && !ride.is_searching() && !ride.is_terminal()
            })
            .cloned())
    }

    async fn upsert_presence(&self, presence: &DriverPresence) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        state
            .presence
            .insert(presence.driver_id, presence.clone());

        Ok(())
    }

    async fn fetch_presence(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, Error> {
        let state = self.state.lock().await;

        Ok(state.presence.get(&driver_id).cloned())
    }

    async fn nearby_drivers(
        &self,
        center: Coordinates,
        radius: f64,
        max_age: Duration,
    ) -> Result<Vec<DriverPresence>, Error> {
        let state = self.state.lock().await;
        let cutoff = Utc::now() - max_age;

        let mut drivers: Vec<(f64, DriverPresence)> = state
            .presence
            .values()
            .filter(|presence| presence.online && presence.updated_at > cutoff)
            .filter_map(|presence| {
                let position = presence.position?;
                let distance = center.haversine_distance(&position);

                (distance <= radius).then(|| (distance, presence.clone()))
            })
            .collect();

        drivers.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(drivers.into_iter().map(|(_, presence)| presence).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Place, RideRequest, VehicleClass};

    fn goma_ride(passenger_id: Uuid, driver_id: Option<Uuid>) -> Ride {
        Ride::request(
            passenger_id,
            RideRequest {
                pickup: Place {
                    coordinates: Coordinates {
                        latitude: -1.6585,
                        longitude: 29.2205,
                    },
                    address: "Boulevard Kanyamuhanga, Goma".into(),
                },
                destination: Place {
                    coordinates: Coordinates {
                        latitude: -1.6135,
                        longitude: 29.2205,
                    },
                    address: "Aéroport international de Goma".into(),
                },
                price: 4500.0,
                distance: 5000.0,
                duration: 900.0,
                driver_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn claim_is_first_writer_wins() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let ride = goma_ride(Uuid::new_v4(), None);
            store.insert_ride(&ride).await.unwrap();

            let winner = Uuid::new_v4();
            let loser = Uuid::new_v4();

            let claimed = store.claim_ride(ride.id, winner).await.unwrap().unwrap();
            assert_eq!(claimed.driver_id, Some(winner));

            assert!(store.claim_ride(ride.id, loser).await.unwrap().is_none());
        });
    }

    #[test]
    fn busy_driver_matches_zero_rows() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let driver_id = Uuid::new_v4();

            let first = goma_ride(Uuid::new_v4(), None);
            let second = goma_ride(Uuid::new_v4(), None);
            store.insert_ride(&first).await.unwrap();
            store.insert_ride(&second).await.unwrap();

            store.claim_ride(first.id, driver_id).await.unwrap().unwrap();

            assert!(store
                .claim_ride(second.id, driver_id)
                .await
                .unwrap()
                .is_none());
        });
    }

    #[test]
    fn conditional_update_rejects_stale_status() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let mut ride = goma_ride(Uuid::new_v4(), None);
            store.insert_ride(&ride).await.unwrap();

            ride.cancel(None).unwrap();

            // the row was already cancelled by the time a second writer
            // tries to move it out of searching
            assert!(store.update_ride(&ride, "searching").await.unwrap());
            assert!(!store.update_ride(&ride, "searching").await.unwrap());
        });
    }

    #[test]
    fn stale_presence_is_invisible_to_nearby_queries() {
        tokio_test::block_on(async {
            let store = MemoryStore::new();
            let center = Coordinates {
                latitude: -1.6585,
                longitude: 29.2205,
            };

            let mut presence = DriverPresence::new(Uuid::new_v4(), VehicleClass::Moto);
            presence.go_online(center, VehicleClass::Moto);
            presence.updated_at = Utc::now() - Duration::seconds(300);
            store.upsert_presence(&presence).await.unwrap();

            let nearby = store
                .nearby_drivers(center, 2000.0, Duration::seconds(60))
                .await
                .unwrap();

            assert!(nearby.is_empty());
        });
    }
}
