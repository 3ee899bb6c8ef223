use async_trait::async_trait;
use chrono::{Duration, Utc};
use geo_types::Geometry;
use geozero::wkb;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, Pool, Postgres, Row};
use uuid::Uuid;

use super::RideStore;
use crate::entities::{Coordinates, DriverPresence, Place, Ride, RideStatus, VehicleClass};
use crate::error::{database_error, Error};

const RIDE_COLUMNS: &str = "\
    id, passenger_id, driver_id, status, \
    pickup_latitude, pickup_longitude, pickup_address, \
    destination_latitude, destination_longitude, destination_address, \
    price, distance, duration, \
    requested_at, accepted_at, started_at, completed_at, cancelled_at, cancel_reason";

const PRESENCE_COLUMNS: &str = "\
    driver_id, online, \
    ST_Y(location) AS latitude, ST_X(location) AS longitude, \
    updated_at, vehicle, rating";

pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::connect", skip_all)]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        // TODO: move schema bootstrap to migrations
        pool.execute(
            "CREATE TABLE IF NOT EXISTS rides (
                id UUID PRIMARY KEY,
                passenger_id UUID NOT NULL,
                driver_id UUID,
                status VARCHAR NOT NULL,
                pickup_latitude DOUBLE PRECISION NOT NULL,
                pickup_longitude DOUBLE PRECISION NOT NULL,
                pickup_address VARCHAR NOT NULL,
                destination_latitude DOUBLE PRECISION NOT NULL,
                destination_longitude DOUBLE PRECISION NOT NULL,
                destination_address VARCHAR NOT NULL,
                price DOUBLE PRECISION NOT NULL,
                distance DOUBLE PRECISION NOT NULL,
                duration DOUBLE PRECISION NOT NULL,
                requested_at TIMESTAMPTZ NOT NULL,
                accepted_at TIMESTAMPTZ,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                cancelled_at TIMESTAMPTZ,
                cancel_reason VARCHAR
            )",
        )
        .await?;

        pool.execute("CREATE INDEX IF NOT EXISTS rides_status_idx ON rides (status)")
            .await?;

        pool.execute(
            "CREATE TABLE IF NOT EXISTS driver_presence (
                driver_id UUID PRIMARY KEY,
                online BOOLEAN NOT NULL,
                location geometry(Point, 4326),
                updated_at TIMESTAMPTZ NOT NULL,
                vehicle VARCHAR NOT NULL,
                rating DOUBLE PRECISION NOT NULL
            )",
        )
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl RideStore for PgStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        conn.execute(
            sqlx::query(
                "INSERT INTO rides (
                    id, passenger_id, driver_id, status,
                    pickup_latitude, pickup_longitude, pickup_address,
                    destination_latitude, destination_longitude, destination_address,
                    price, distance, duration,
                    requested_at, accepted_at, started_at, completed_at, cancelled_at, cancel_reason
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
            )
            .bind(&ride.id)
            .bind(&ride.passenger_id)
            .bind(&ride.driver_id)
            .bind(ride.status.name())
            .bind(ride.pickup.coordinates.latitude)
            .bind(ride.pickup.coordinates.longitude)
            .bind(&ride.pickup.address)
            .bind(ride.destination.coordinates.latitude)
            .bind(ride.destination.coordinates.longitude)
            .bind(&ride.destination.address)
            .bind(ride.price)
            .bind(ride.distance)
            .bind(ride.duration)
            .bind(ride.requested_at)
            .bind(ride.accepted_at)
            .bind(ride.started_at)
            .bind(ride.completed_at)
            .bind(ride.cancelled_at)
            .bind(&ride.cancel_reason),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS);

        conn.fetch_optional(sqlx::query(&query).bind(&id))
            .await?
            .map(|row| ride_from_row(&row))
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_ride(&self, id: Uuid, driver_id: Uuid) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        // One conditional statement; the returned row count is the claim
        // verdict. Zero rows means the ride was taken, cancelled, targeted
        // elsewhere, or the driver already carries an active ride.
        let query = format!(
            "UPDATE rides
            SET driver_id = $2, status = 'accepted', accepted_at = $3
            WHERE id = $1
                AND status = 'searching'
                AND (driver_id IS NULL OR driver_id = $2)
                AND NOT EXISTS (
                    SELECT 1 FROM rides active
                    WHERE active.driver_id = $2
                        AND active.id <> $1
                        AND active.status IN ('accepted', 'arrived', 'in_progress')
                )
            RETURNING {}",
            RIDE_COLUMNS
        );

        conn.fetch_optional(
            sqlx::query(&query)
                .bind(&id)
                .bind(&driver_id)
                .bind(Utc::now()),
        )
        .await?
        .map(|row| ride_from_row(&row))
        .transpose()
    }

    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn update_ride(&self, ride: &Ride, expected: &str) -> Result<bool, Error> {
        let mut conn = self.pool.acquire().await?;

        let result = conn
            .execute(
                sqlx::query(
                    "UPDATE rides
                    SET status = $2, driver_id = $3, accepted_at = $4, started_at = $5,
                        completed_at = $6, cancelled_at = $7, cancel_reason = $8
                    WHERE id = $1 AND status = $9",
                )
                .bind(&ride.id)
                .bind(ride.status.name())
                .bind(&ride.driver_id)
                .bind(ride.accepted_at)
                .bind(ride.started_at)
                .bind(ride.completed_at)
                .bind(ride.cancelled_at)
                .bind(&ride.cancel_reason)
                .bind(expected),
            )
            .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn open_rides(&self, driver_id: Uuid) -> Result<Vec<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = format!(
            "SELECT {} FROM rides
            WHERE status = 'searching' AND (driver_id IS NULL OR driver_id = $1)
            ORDER BY requested_at ASC",
            RIDE_COLUMNS
        );

        let rows = conn.fetch_all(sqlx::query(&query).bind(&driver_id)).await?;

        rows.iter().map(ride_from_row).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn active_ride_for_driver(&self, driver_id: Uuid) -> Result<Option<Ride>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = format!(
            "SELECT {} FROM rides
            WHERE driver_id = $1 AND status IN ('accepted', 'arrived', 'in_progress')
            LIMIT 1",
            RIDE_COLUMNS
        );

        conn.fetch_optional(sqlx::query(&query).bind(&driver_id))
            .await?
            .map(|row| ride_from_row(&row))
            .transpose()
    }

    #[tracing::instrument(skip(self, presence), fields(driver_id = %presence.driver_id))]
    async fn upsert_presence(&self, presence: &DriverPresence) -> Result<(), Error> {
        let mut conn = self.pool.acquire().await?;

        let location = presence
            .position
            .map(|coordinates| wkb::Encode(Geometry::from(coordinates)));

        conn.execute(
            sqlx::query(
                "INSERT INTO driver_presence (driver_id, online, location, updated_at, vehicle, rating)
                VALUES ($1, $2, ST_SetSRID($3, 4326), $4, $5, $6)
                ON CONFLICT (driver_id) DO UPDATE
                SET online = $2, location = ST_SetSRID($3, 4326), updated_at = $4, vehicle = $5, rating = $6",
            )
            .bind(&presence.driver_id)
            .bind(presence.online)
            .bind(location)
            .bind(presence.updated_at)
            .bind(presence.vehicle.name())
            .bind(presence.rating),
        )
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fetch_presence(&self, driver_id: Uuid) -> Result<Option<DriverPresence>, Error> {
        let mut conn = self.pool.acquire().await?;

        let query = format!(
            "SELECT {} FROM driver_presence WHERE driver_id = $1",
            PRESENCE_COLUMNS
        );

        conn.fetch_optional(sqlx::query(&query).bind(&driver_id))
            .await?
            .map(|row| presence_from_row(&row))
            .transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn nearby_drivers(
        &self,
        center: Coordinates,
        radius: f64,
        max_age: Duration,
    ) -> Result<Vec<DriverPresence>, Error> {
        let mut conn = self.pool.acquire().await?;

        let center: Geometry<f64> = center.into();
        let cutoff = Utc::now() - max_age;

        let query = format!(
            "SELECT {} FROM driver_presence
            WHERE online
                AND location IS NOT NULL
                AND updated_at > $3
                AND ST_DWithin(location::geography, ST_SetSRID($1, 4326)::geography, $2)
            ORDER BY ST_Distance(location, ST_SetSRID($1, 4326)) ASC",
            PRESENCE_COLUMNS
        );

        let rows = conn
            .fetch_all(
                sqlx::query(&query)
                    .bind(wkb::Encode(center))
                    .bind(radius)
                    .bind(cutoff),
            )
            .await?;

        rows.iter().map(presence_from_row).collect()
    }
}

fn ride_from_row(row: &PgRow) -> Result<Ride, Error> {
    let status: String = row.try_get("status")?;
    let status = RideStatus::from_name(&status).ok_or_else(|| database_error(&status))?;

    Ok(Ride {
        id: row.try_get("id")?,
        status,
        passenger_id: row.try_get("passenger_id")?,
        driver_id: row.try_get("driver_id")?,
        pickup: Place {
            coordinates: Coordinates {
                latitude: row.try_get("pickup_latitude")?,
                longitude: row.try_get("pickup_longitude")?,
            },
            address: row.try_get("pickup_address")?,
        },
        destination: Place {
            coordinates: Coordinates {
                latitude: row.try_get("destination_latitude")?,
                longitude: row.try_get("destination_longitude")?,
            },
            address: row.try_get("destination_address")?,
        },
        price: row.try_get("price")?,
        distance: row.try_get("distance")?,
        duration: row.try_get("duration")?,
        requested_at: row.try_get("requested_at")?,
        accepted_at: row.try_get("accepted_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        cancelled_at: row.try_get("cancelled_at")?,
        cancel_reason: row.try_get("cancel_reason")?,
    })
}

fn presence_from_row(row: &PgRow) -> Result<DriverPresence, Error> {
    let vehicle: String = row.try_get("vehicle")?;
    let vehicle = VehicleClass::from_name(&vehicle).ok_or_else(|| database_error(&vehicle))?;

    let latitude: Option<f64> = row.try_get("latitude")?;
    let longitude: Option<f64> = row.try_get("longitude")?;
    let position = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(Coordinates {
            latitude,
            longitude,
        }),
        _ => None,
    };

    Ok(DriverPresence {
        driver_id: row.try_get("driver_id")?,
        online: row.try_get("online")?,
        position,
        updated_at: row.try_get("updated_at")?,
        vehicle,
        rating: row.try_get("rating")?,
    })
}
