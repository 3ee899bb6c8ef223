mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use crate::entities::{Coordinates, DriverPresence, Ride};
use crate::error::Error;

/// Narrow repository surface the engine is built against. Every status
/// mutation goes through one of the two conditional writes; there is no
/// read-then-write path to the status column.
#[async_trait]
pub trait RideStore: Send + Sync {
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error>;

    async fn fetch_ride(&self, id: Uuid) -> Result<Option<Ride>, Error>;

    /// The claim protocol's compare-and-swap: bind `driver_id` and flip the
    /// ride to accepted in a single indivisible write, predicated on the
    /// ride still being open to this driver and the driver not already
    /// carrying a non-terminal ride. `None` means zero rows matched.
    async fn claim_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Option<Ride>, Error>;

    /// Write a ride back predicated on the status name the caller read.
    /// `false` means the row moved under the caller and nothing changed.
    async fn update_ride(&self, ride: &Ride, expected: &str) -> Result<bool, Error>;

    /// Searching rides visible to one driver: broadcast requests plus
    /// requests targeted at that driver.
    async fn open_rides(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error>;

    async fn active_ride_for_driver(&self, driver_id: Uuid) -> Result<Option<Ride>, Error>;

    async fn upsert_presence(&self, presence: &DriverPresence) -> Result<(), Error>;

    async fn fetch_presence(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, Error>;

    /// Online drivers within `radius` meters whose last report is younger
    /// than `max_age`. Staleness is this query's policy, not the store's.
    async fn nearby_drivers(
        &self,
        center: Coordinates,
        radius: f64,
        max_age: Duration,
    ) -> Result<Vec<DriverPresence>, Error>;
}
