use async_trait::async_trait;
use uuid::Uuid;

use crate::identity::normalize_email;
use crate::trip::Trip;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Trip not found: {0}")]
    NotFound(Uuid),
    #[error("Precondition failed for trip {0}")]
    PreconditionFailed(Uuid),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt trip record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

impl StoreError {
    /// Transient backend failures; the only kind a read may be retried on.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// What must still be true of the stored trip at the instant of the write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// A seat is free, nobody is bound and the trip is not complete.
    SeatOpen,
    /// The trip is bound to this passenger.
    BoundTo(String),
    /// The trip was posted by this driver.
    DrivenBy(String),
}

impl Precondition {
    pub fn holds(&self, trip: &Trip) -> bool {
        match self {
            Precondition::SeatOpen => {
                trip.available_seats > 0 && trip.passenger_email.is_none() && !trip.complete
            }
            Precondition::BoundTo(email) => trip.is_bound_to(email),
            Precondition::DrivenBy(email) => normalize_email(&trip.driver_email) == normalize_email(email),
        }
    }
}

/// The change applied when the precondition holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Take one seat and bind the passenger. Completes the trip on the last seat.
    ClaimSeat { passenger_email: String },
    /// Give the seat back and unbind. `complete` falls back to `closed_by_driver`.
    ReleaseSeat,
    /// Driver closes the trip for further reservations.
    Close,
}

impl Mutation {
    /// Returns the trip as it would be after the mutation, or `None` when the
    /// result would leave `available_seats` outside `0..=total_seats`.
    pub fn apply(&self, trip: &Trip) -> Option<Trip> {
        let mut next = trip.clone();
        match self {
            Mutation::ClaimSeat { passenger_email } => {
                next.available_seats = trip.available_seats.checked_sub(1)?;
                next.passenger_email = Some(passenger_email.clone());
                if next.available_seats == 0 {
                    next.complete = true;
                }
            }
            Mutation::ReleaseSeat => {
                next.available_seats = trip.available_seats.checked_add(1)?;
                if next.available_seats > trip.total_seats {
                    return None;
                }
                next.passenger_email = None;
                next.complete = trip.closed_by_driver;
            }
            Mutation::Close => {
                next.complete = true;
                next.closed_by_driver = true;
            }
        }
        Some(next)
    }
}

/// Read-side selection over trips.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TripFilter {
    /// Only trips that still take reservations.
    pub open_only: bool,
    /// Drop trips bound to this passenger.
    pub exclude_passenger: Option<String>,
    /// Keep only trips bound to this passenger.
    pub passenger: Option<String>,
}

impl TripFilter {
    pub fn open_for(email: impl Into<String>) -> Self {
        Self {
            open_only: true,
            exclude_passenger: Some(email.into()),
            passenger: None,
        }
    }

    pub fn reserved_by(email: impl Into<String>) -> Self {
        Self {
            open_only: false,
            exclude_passenger: None,
            passenger: Some(email.into()),
        }
    }

    pub fn matches(&self, trip: &Trip) -> bool {
        if self.open_only && !trip.is_open() {
            return false;
        }
        if let Some(excluded) = &self.exclude_passenger {
            if trip.is_bound_to(excluded) {
                return false;
            }
        }
        if let Some(passenger) = &self.passenger {
            if !trip.is_bound_to(passenger) {
                return false;
            }
        }
        true
    }
}

/// Durable trip records.
///
/// `conditional_update` is the only write path: implementations must check the
/// precondition and apply the mutation as one atomic unit (a compare-and-swap,
/// a single-statement update or a server-side script), never as a read
/// followed by a separate write.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Trip, StoreError>;

    async fn conditional_update(
        &self,
        id: Uuid,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> Result<Trip, StoreError>;

    async fn query(&self, filter: &TripFilter) -> Result<Vec<Trip>, StoreError>;
}
