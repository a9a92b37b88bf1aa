use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use carpool_core::{
    normalize_email, Coordinate, Mutation, Place, Precondition, StoreError, Trip, TripFilter, TripStore,
};

const TRIP_COLUMNS: &str = "id, driver_email, passenger_email, \
    origin_label, origin_lat, origin_lng, \
    destination_label, destination_lat, destination_lng, \
    license_plate, total_seats, available_seats, complete, closed_by_driver, cost, created_at";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    driver_email: String,
    passenger_email: Option<String>,
    origin_label: String,
    origin_lat: f64,
    origin_lng: f64,
    destination_label: String,
    destination_lat: f64,
    destination_lng: f64,
    license_plate: String,
    total_seats: i32,
    available_seats: i32,
    complete: bool,
    closed_by_driver: bool,
    cost: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = StoreError;

    fn try_from(row: TripRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| StoreError::Corrupt { id: row.id.to_string(), reason };
        let count = |name: &str, value: i32| {
            u32::try_from(value).map_err(|_| corrupt(format!("{} is negative: {}", name, value)))
        };

        let origin = Coordinate::new(row.origin_lat, row.origin_lng).map_err(|e| corrupt(e.to_string()))?;
        let destination =
            Coordinate::new(row.destination_lat, row.destination_lng).map_err(|e| corrupt(e.to_string()))?;

        let trip = Trip {
            id: row.id,
            total_seats: count("total_seats", row.total_seats)?,
            available_seats: count("available_seats", row.available_seats)?,
            cost: count("cost", row.cost)?,
            driver_email: normalize_email(&row.driver_email),
            passenger_email: row.passenger_email,
            origin: Place::new(row.origin_label, origin),
            destination: Place::new(row.destination_label, destination),
            license_plate: row.license_plate,
            complete: row.complete,
            closed_by_driver: row.closed_by_driver,
            created_at: row.created_at,
        };
        if !trip.seats_in_bounds() {
            return Err(StoreError::Corrupt {
                id: trip.id.to_string(),
                reason: "available_seats exceeds total_seats".to_string(),
            });
        }
        Ok(trip)
    }
}

/// Postgres-backed trips. The guarded `UPDATE ... RETURNING` is the atomic
/// check-and-set: the row lock taken by the update serialises competing claims.
#[derive(Clone)]
pub struct PostgresTripStore {
    pool: Pool<Postgres>,
}

impl PostgresTripStore {
    pub fn new(client: &DbClient) -> Self {
        Self { pool: client.pool.clone() }
    }

    pub async fn seed_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let seats = |value: u32| i32::try_from(value).map_err(|e| StoreError::Corrupt {
            id: trip.id.to_string(),
            reason: e.to_string(),
        });

        sqlx::query(
            "INSERT INTO trips (id, driver_email, passenger_email, \
             origin_label, origin_lat, origin_lng, \
             destination_label, destination_lat, destination_lng, \
             license_plate, total_seats, available_seats, complete, closed_by_driver, cost, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(trip.id)
        .bind(&trip.driver_email)
        .bind(&trip.passenger_email)
        .bind(&trip.origin.label)
        .bind(trip.origin.coordinate.lat)
        .bind(trip.origin.coordinate.lng)
        .bind(&trip.destination.label)
        .bind(trip.destination.coordinate.lat)
        .bind(trip.destination.coordinate.lng)
        .bind(&trip.license_plate)
        .bind(seats(trip.total_seats)?)
        .bind(seats(trip.available_seats)?)
        .bind(trip.complete)
        .bind(trip.closed_by_driver)
        .bind(seats(trip.cost)?)
        .bind(trip.created_at)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        info!("Trip seeded in Postgres: {}", trip.id);
        Ok(())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM trips WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TripStore for PostgresTripStore {
    async fn get(&self, id: Uuid) -> Result<Trip, StoreError> {
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Trip::try_from(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> Result<Trip, StoreError> {
        let mut builder = update_statement(id, precondition, mutation);
        let row: Option<TripRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => Trip::try_from(row),
            None if self.exists(id).await? => Err(StoreError::PreconditionFailed(id)),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn query(&self, filter: &TripFilter) -> Result<Vec<Trip>, StoreError> {
        let mut builder = select_statement(filter);
        let rows: Vec<TripRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;

        rows.into_iter().map(Trip::try_from).collect()
    }
}

fn update_statement<'a>(id: Uuid, precondition: &'a Precondition, mutation: &'a Mutation) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE trips SET ");
    match mutation {
        Mutation::ClaimSeat { passenger_email } => {
            builder
                .push("available_seats = available_seats - 1, complete = (complete OR available_seats = 1), passenger_email = ")
                .push_bind(passenger_email.as_str());
        }
        Mutation::ReleaseSeat => {
            builder.push("available_seats = available_seats + 1, passenger_email = NULL, complete = closed_by_driver");
        }
        Mutation::Close => {
            builder.push("complete = TRUE, closed_by_driver = TRUE");
        }
    }

    builder.push(" WHERE id = ").push_bind(id);
    match precondition {
        Precondition::SeatOpen => {
            builder.push(" AND available_seats > 0 AND passenger_email IS NULL AND NOT complete");
        }
        Precondition::BoundTo(email) => {
            builder.push(" AND passenger_email = ").push_bind(email.as_str());
        }
        Precondition::DrivenBy(email) => {
            builder.push(" AND lower(btrim(driver_email)) = ").push_bind(email.as_str());
        }
    }
    match mutation {
        Mutation::ClaimSeat { .. } => {
            builder.push(" AND available_seats >= 1");
        }
        Mutation::ReleaseSeat => {
            builder.push(" AND available_seats < total_seats");
        }
        Mutation::Close => {}
    }

    builder.push(" RETURNING ").push(TRIP_COLUMNS);
    builder
}

fn select_statement(filter: &TripFilter) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new("SELECT ");
    builder.push(TRIP_COLUMNS).push(" FROM trips WHERE TRUE");
    if filter.open_only {
        builder.push(" AND NOT complete AND available_seats > 0");
    }
    if let Some(email) = &filter.exclude_passenger {
        builder
            .push(" AND passenger_email IS DISTINCT FROM ")
            .push_bind(email.as_str());
    }
    if let Some(email) = &filter.passenger {
        builder.push(" AND passenger_email = ").push_bind(email.as_str());
    }
    builder.push(" ORDER BY created_at");
    builder
}

fn unavailable(err: sqlx::Error) -> StoreError {
    error!("Postgres error: {}", err);
    StoreError::Unavailable(err.to_string())
}
