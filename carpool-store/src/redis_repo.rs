use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

use carpool_core::{
    normalize_email, Coordinate, Mutation, Place, Precondition, StoreError, Trip, TripFilter, TripStore,
};

const TRIP_INDEX_KEY: &str = "trips:index";
/// Stored in `passenger_email` while no passenger is bound.
const NO_PASSENGER: &str = "none";

/// Checks the precondition and applies the mutation inside Redis, so no other
/// client can interleave between the two.
///
/// Replies `{1, HGETALL}` on success, `{0, {}}` when the precondition (or the
/// seat bounds) do not hold and `{-1, {}}` when the trip does not exist.
const CONDITIONAL_UPDATE_SCRIPT: &str = r#"
    if redis.call("EXISTS", KEYS[1]) == 0 then
        return {-1, {}}
    end

    local available = tonumber(redis.call("HGET", KEYS[1], "available_seats"))
    local total = tonumber(redis.call("HGET", KEYS[1], "total_seats"))
    if not available or not total then
        return redis.error_reply("corrupt seat counters on " .. KEYS[1])
    end
    local passenger = redis.call("HGET", KEYS[1], "passenger_email")
    local driver = redis.call("HGET", KEYS[1], "driver_email")
    local complete = redis.call("HGET", KEYS[1], "complete")
    local closed = redis.call("HGET", KEYS[1], "closed_by_driver")

    local holds
    if ARGV[1] == "seat_open" then
        holds = available > 0 and passenger == "none" and complete == "0"
    elseif ARGV[1] == "bound_to" then
        holds = passenger == ARGV[2]
    elseif ARGV[1] == "driven_by" then
        holds = string.lower(driver):match("^%s*(.-)%s*$") == ARGV[2]
    else
        return redis.error_reply("unknown precondition " .. ARGV[1])
    end
    if not holds then
        return {0, {}}
    end

    if ARGV[3] == "claim_seat" then
        if available < 1 then
            return {0, {}}
        end
        available = available - 1
        if available == 0 then
            complete = "1"
        end
        redis.call("HSET", KEYS[1], "available_seats", available, "passenger_email", ARGV[4], "complete", complete)
    elseif ARGV[3] == "release_seat" then
        if available >= total then
            return {0, {}}
        end
        redis.call("HSET", KEYS[1], "available_seats", available + 1, "passenger_email", "none", "complete", closed)
    elseif ARGV[3] == "close" then
        redis.call("HSET", KEYS[1], "complete", "1", "closed_by_driver", "1")
    else
        return redis.error_reply("unknown mutation " .. ARGV[3])
    end

    return {1, redis.call("HGETALL", KEYS[1])}
"#;

/// Trips kept as Redis hashes (`trip:{id}`), ids indexed in `trips:index`.
#[derive(Clone)]
pub struct RedisTripStore {
    client: redis::Client,
    update_script: redis::Script,
}

impl RedisTripStore {
    /// Parses the URL only; connections are opened per call.
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            update_script: redis::Script::new(CONDITIONAL_UPDATE_SCRIPT),
        })
    }

    /// Writes a trip as posted by the driver flow.
    pub async fn seed_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = trip_key(trip.id);
        let fields = encode_trip(trip);

        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(&key, &fields)
            .ignore()
            .sadd(TRIP_INDEX_KEY, trip.id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;

        info!("Trip seeded in Redis: {}", trip.id);
        Ok(())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)
    }
}

#[async_trait]
impl TripStore for RedisTripStore {
    async fn get(&self, id: Uuid) -> Result<Trip, StoreError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(trip_key(id)).await.map_err(unavailable)?;
        if fields.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        decode_trip(id, &fields)
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> Result<Trip, StoreError> {
        let mut conn = self.connection().await?;
        let (precondition_name, precondition_arg) = precondition_args(precondition);
        let (mutation_name, mutation_arg) = mutation_args(mutation);

        let (code, flat): (i64, Vec<String>) = self
            .update_script
            .key(trip_key(id))
            .arg(precondition_name)
            .arg(precondition_arg)
            .arg(mutation_name)
            .arg(mutation_arg)
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        match code {
            1 => decode_trip(id, &pairs(flat)),
            0 => Err(StoreError::PreconditionFailed(id)),
            _ => Err(StoreError::NotFound(id)),
        }
    }

    async fn query(&self, filter: &TripFilter) -> Result<Vec<Trip>, StoreError> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = conn.smembers(TRIP_INDEX_KEY).await.map_err(unavailable)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.hgetall(format!("trip:{}", id));
        }
        let hashes: Vec<HashMap<String, String>> =
            pipe.query_async(&mut conn).await.map_err(unavailable)?;

        let mut trips = Vec::with_capacity(hashes.len());
        for (raw_id, fields) in ids.iter().zip(hashes) {
            // Indexed but already removed
            if fields.is_empty() {
                continue;
            }
            let id = Uuid::parse_str(raw_id).map_err(|e| StoreError::Corrupt {
                id: raw_id.clone(),
                reason: e.to_string(),
            })?;
            let trip = decode_trip(id, &fields)?;
            if filter.matches(&trip) {
                trips.push(trip);
            }
        }
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trips)
    }
}

fn trip_key(id: Uuid) -> String {
    format!("trip:{}", id)
}

fn unavailable(err: redis::RedisError) -> StoreError {
    error!("Redis error: {}", err);
    StoreError::Unavailable(err.to_string())
}

fn pairs(flat: Vec<String>) -> HashMap<String, String> {
    let mut map = HashMap::with_capacity(flat.len() / 2);
    let mut it = flat.into_iter();
    while let (Some(field), Some(value)) = (it.next(), it.next()) {
        map.insert(field, value);
    }
    map
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn precondition_args(precondition: &Precondition) -> (&'static str, String) {
    match precondition {
        Precondition::SeatOpen => ("seat_open", String::new()),
        Precondition::BoundTo(email) => ("bound_to", email.clone()),
        Precondition::DrivenBy(email) => ("driven_by", email.clone()),
    }
}

fn mutation_args(mutation: &Mutation) -> (&'static str, String) {
    match mutation {
        Mutation::ClaimSeat { passenger_email } => ("claim_seat", passenger_email.clone()),
        Mutation::ReleaseSeat => ("release_seat", String::new()),
        Mutation::Close => ("close", String::new()),
    }
}

fn encode_trip(trip: &Trip) -> Vec<(&'static str, String)> {
    vec![
        ("driver_email", trip.driver_email.clone()),
        (
            "passenger_email",
            trip.passenger_email.clone().unwrap_or_else(|| NO_PASSENGER.to_string()),
        ),
        ("origin_label", trip.origin.label.clone()),
        ("origin_lat", trip.origin.coordinate.lat.to_string()),
        ("origin_lng", trip.origin.coordinate.lng.to_string()),
        ("destination_label", trip.destination.label.clone()),
        ("destination_lat", trip.destination.coordinate.lat.to_string()),
        ("destination_lng", trip.destination.coordinate.lng.to_string()),
        ("license_plate", trip.license_plate.clone()),
        ("total_seats", trip.total_seats.to_string()),
        ("available_seats", trip.available_seats.to_string()),
        ("complete", flag(trip.complete)),
        ("closed_by_driver", flag(trip.closed_by_driver)),
        ("cost", trip.cost.to_string()),
        ("created_at", trip.created_at.to_rfc3339()),
    ]
}

fn decode_trip(id: Uuid, fields: &HashMap<String, String>) -> Result<Trip, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt { id: id.to_string(), reason };
    let text = |name: &str| -> Result<String, StoreError> {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| corrupt(format!("missing field {}", name)))
    };
    let number = |name: &str| -> Result<f64, StoreError> {
        text(name)?.parse::<f64>().map_err(|e| corrupt(format!("{}: {}", name, e)))
    };
    let count = |name: &str| -> Result<u32, StoreError> {
        text(name)?.parse::<u32>().map_err(|e| corrupt(format!("{}: {}", name, e)))
    };
    let place = |prefix: &str| -> Result<Place, StoreError> {
        let coordinate = Coordinate::new(number(&format!("{}_lat", prefix))?, number(&format!("{}_lng", prefix))?)
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(Place::new(text(&format!("{}_label", prefix))?, coordinate))
    };

    let passenger = text("passenger_email")?;
    let created_at = DateTime::parse_from_rfc3339(&text("created_at")?)
        .map_err(|e| corrupt(format!("created_at: {}", e)))?
        .with_timezone(&Utc);

    let trip = Trip {
        id,
        driver_email: normalize_email(&text("driver_email")?),
        passenger_email: (passenger != NO_PASSENGER).then_some(passenger),
        origin: place("origin")?,
        destination: place("destination")?,
        license_plate: text("license_plate")?,
        total_seats: count("total_seats")?,
        available_seats: count("available_seats")?,
        complete: text("complete")? == "1",
        closed_by_driver: text("closed_by_driver")? == "1",
        cost: count("cost")?,
        created_at,
    };
    if !trip.seats_in_bounds() {
        return Err(corrupt("available_seats exceeds total_seats".to_string()));
    }
    Ok(trip)
}
