use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use carpool_shared::Masked;

use crate::geo::{Coordinate, Place};
use crate::identity::normalize_email;

/// A driver-posted ride offer.
///
/// Only the reservation engine changes `passenger_email`, `available_seats`
/// and `complete`, and always through a single conditional store write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub driver_email: String,
    pub passenger_email: Option<String>,
    pub origin: Place,
    pub destination: Place,
    pub license_plate: String,
    pub total_seats: u32,
    pub available_seats: u32,
    pub complete: bool,
    /// Set when the driver closed the trip, so a cancellation does not reopen it.
    pub closed_by_driver: bool,
    pub cost: u32,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    pub fn new(
        driver_email: impl Into<String>,
        origin: Place,
        destination: Place,
        license_plate: impl Into<String>,
        total_seats: u32,
        cost: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            driver_email: normalize_email(&driver_email.into()),
            passenger_email: None,
            origin,
            destination,
            license_plate: license_plate.into(),
            total_seats,
            available_seats: total_seats,
            complete: total_seats == 0,
            closed_by_driver: false,
            cost,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.complete && self.available_seats > 0
    }

    pub fn is_bound_to(&self, email: &str) -> bool {
        self.passenger_email.as_deref() == Some(email)
    }

    pub fn seats_in_bounds(&self) -> bool {
        self.available_seats <= self.total_seats
    }

    /// The trip as `viewer` may see it: the bound passenger's e-mail is
    /// masked unless the viewer is that passenger or the driver.
    pub fn as_seen_by(&self, viewer: &str) -> Trip {
        if self.is_bound_to(viewer) || self.driver_email == viewer {
            self.clone()
        } else {
            self.for_broadcast()
        }
    }

    /// The trip as pushed to every subscriber, with the passenger e-mail masked.
    pub fn for_broadcast(&self) -> Trip {
        let mut trip = self.clone();
        trip.passenger_email = self
            .passenger_email
            .as_deref()
            .map(|email| Masked(email).to_string());
        trip
    }
}

/// One reservation call's view of the world. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationAttempt {
    pub trip_id: Uuid,
    pub passenger_email: String,
    pub observed: Coordinate,
    pub attempted_at: DateTime<Utc>,
}

impl ReservationAttempt {
    pub fn new(trip_id: Uuid, passenger_email: impl Into<String>, observed: Coordinate) -> Self {
        Self {
            trip_id,
            passenger_email: passenger_email.into(),
            observed,
            attempted_at: Utc::now(),
        }
    }
}
