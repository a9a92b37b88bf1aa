use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::geo::Coordinate;
use crate::trip::Trip;

/// A trip as shown in a listing, with the advisory location annotation if one
/// is cached for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListedTrip {
    #[serde(flatten)]
    pub trip: Trip,
    pub annotation: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservationReceipt {
    pub trip_id: Uuid,
    pub passenger_email: String,
    pub available_seats: u32,
    pub total_seats: u32,
    pub complete: bool,
    pub distance_km: f64,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CancellationReceipt {
    pub trip_id: Uuid,
    pub available_seats: u32,
    pub complete: bool,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckInOutcome {
    pub trip_id: Uuid,
    pub distance_km: f64,
    pub threshold_km: f64,
    pub admitted: bool,
}
