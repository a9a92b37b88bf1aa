use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::trip::Trip;

/// The whole trip right after a committed write.
///
/// Subscribers replace their copy of the trip with `trip`; nothing in here is
/// a delta. The passenger e-mail is masked because every subscriber sees it.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct TripSnapshot {
    pub trip: Trip,
    pub timestamp: i64,
}

impl TripSnapshot {
    pub fn of(trip: &Trip) -> Self {
        Self {
            trip: trip.for_broadcast(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    SeatReserved(TripSnapshot),
    SeatReleased(TripSnapshot),
    TripClosed(TripSnapshot),
}

impl TripEvent {
    pub fn snapshot(&self) -> &TripSnapshot {
        match self {
            TripEvent::SeatReserved(s) | TripEvent::SeatReleased(s) | TripEvent::TripClosed(s) => s,
        }
    }

    pub fn trip_id(&self) -> Uuid {
        self.snapshot().trip.id
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            TripEvent::SeatReserved(_) => "seat_reserved",
            TripEvent::SeatReleased(_) => "seat_released",
            TripEvent::TripClosed(_) => "trip_closed",
        }
    }
}
