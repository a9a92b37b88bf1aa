pub mod annotation;
pub mod events;
pub mod geo;
pub mod identity;
pub mod location;
pub mod repository;
pub mod search;
pub mod trip;

use uuid::Uuid;

pub use annotation::{AnnotationCache, InMemoryAnnotationCache};
pub use events::{TripEvent, TripSnapshot};
pub use geo::{Coordinate, GeoError, Geofence, GeofencePolicy, Place, ProximityCheck};
pub use identity::{normalize_email, IdentityError, PassengerIdentity};
pub use location::{LocationError, LocationProvider, ReportedLocation};
pub use repository::{Mutation, Precondition, StoreError, TripFilter, TripStore};
pub use search::{CancellationReceipt, CheckInOutcome, ListedTrip, ReservationReceipt};
pub use trip::{ReservationAttempt, Trip};

/// Every way a reservation, cancellation or check-in can end without success.
///
/// Geofence and capacity outcomes are expected results for the caller to show,
/// not faults. Only `StoreUnavailable` is ever worth retrying, and then only for reads.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReservationError {
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),
    #[error("Out of range: caller is {distance_km:.3} km from the reference point, limit is {threshold_km} km")]
    OutOfRange { distance_km: f64, threshold_km: f64 },
    #[error("Seat no longer available on trip {0}")]
    SeatNoLongerAvailable(Uuid),
    #[error("Trip is full: {0}")]
    TripFull(Uuid),
    #[error("Trip {0} is not reserved by the caller")]
    NotReservedByCaller(Uuid),
    #[error("Trip {0} is not driven by the caller")]
    NotTripDriver(Uuid),
    #[error("Trip not found: {0}")]
    NotFound(Uuid),
    #[error("Trip store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type ReservationResult<T> = Result<T, ReservationError>;

impl From<GeoError> for ReservationError {
    fn from(err: GeoError) -> Self {
        ReservationError::InvalidCoordinate(err.to_string())
    }
}

impl From<LocationError> for ReservationError {
    fn from(err: LocationError) -> Self {
        ReservationError::LocationUnavailable(err.to_string())
    }
}
