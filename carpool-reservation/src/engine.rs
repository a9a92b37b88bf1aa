use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use carpool_core::{
    AnnotationCache, CancellationReceipt, CheckInOutcome, Coordinate, GeofencePolicy,
    LocationError, LocationProvider, Mutation, PassengerIdentity, Precondition,
    ReservationAttempt, ReservationError, ReservationReceipt, ReservationResult, StoreError,
    Trip, TripEvent, TripSnapshot, TripStore,
};

use crate::retry::{retry_reads, RetryPolicy};

pub const DEFAULT_LOCATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates seat claims and releases against a [`TripStore`].
///
/// The engine keeps no lock of its own. Every state change is a single
/// `conditional_update`, so two devices racing for the same seat are ordered
/// by the store and at most one of them wins.
pub struct ReservationEngine {
    store: Arc<dyn TripStore>,
    annotations: Arc<dyn AnnotationCache>,
    geofence: GeofencePolicy,
    location_timeout: Duration,
    read_retry: RetryPolicy,
    events: Option<broadcast::Sender<TripEvent>>,
}

impl ReservationEngine {
    pub fn new(
        store: Arc<dyn TripStore>,
        annotations: Arc<dyn AnnotationCache>,
        geofence: GeofencePolicy,
    ) -> Self {
        Self {
            store,
            annotations,
            geofence,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            read_retry: RetryPolicy::default(),
            events: None,
        }
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Publish a [`TripEvent`] after every committed write.
    pub fn with_events(mut self, sender: broadcast::Sender<TripEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn geofence(&self) -> &GeofencePolicy {
        &self.geofence
    }

    pub async fn trip(&self, trip_id: Uuid) -> ReservationResult<Trip> {
        self.fetch(trip_id).await
    }

    /// Transition: Open → Reserved (one seat taken, caller bound)
    ///
    /// Full trips are rejected before the location is even requested. The
    /// geofence is evaluated before the store is written, and a failed
    /// geofence never reaches the store.
    pub async fn reserve(
        &self,
        identity: &PassengerIdentity,
        trip_id: Uuid,
        location: &dyn LocationProvider,
    ) -> ReservationResult<ReservationReceipt> {
        let fence = self.geofence.reservation_fence()?;

        let trip = self.fetch(trip_id).await?;
        if !trip.is_open() {
            warn!(%trip_id, passenger = %identity.masked(), "Reservation rejected: trip is full or closed");
            return Err(ReservationError::TripFull(trip_id));
        }

        let observed = self.locate(location).await?;
        let attempt = ReservationAttempt::new(trip_id, identity.email(), observed);

        let check = fence.check(&attempt.observed)?;
        if !check.admitted {
            warn!(
                %trip_id,
                passenger = %identity.masked(),
                distance_km = check.distance_km,
                threshold_km = check.threshold_km,
                "Reservation rejected: caller outside geofence"
            );
            return Err(ReservationError::OutOfRange {
                distance_km: check.distance_km,
                threshold_km: check.threshold_km,
            });
        }

        let claim = Mutation::ClaimSeat {
            passenger_email: attempt.passenger_email.clone(),
        };
        let updated = match self
            .store
            .conditional_update(trip_id, &Precondition::SeatOpen, &claim)
            .await
        {
            Ok(trip) => trip,
            Err(StoreError::PreconditionFailed(_)) => {
                warn!(%trip_id, passenger = %identity.masked(), "Reservation lost the race for the seat");
                return Err(ReservationError::SeatNoLongerAvailable(trip_id));
            }
            Err(err) => return Err(store_failure(err)),
        };

        self.annotations.set(identity, trip_id, attempt.observed);
        self.publish(TripEvent::SeatReserved(TripSnapshot::of(&updated)));

        info!(
            %trip_id,
            passenger = %identity.masked(),
            available_seats = updated.available_seats,
            "Seat reserved"
        );

        Ok(ReservationReceipt {
            trip_id,
            passenger_email: attempt.passenger_email,
            available_seats: updated.available_seats,
            total_seats: updated.total_seats,
            complete: updated.complete,
            distance_km: check.distance_km,
            reserved_at: attempt.attempted_at,
        })
    }

    /// Transition: Reserved → Open (seat returned, caller unbound)
    ///
    /// A second cancel, or a cancel from anyone other than the bound
    /// passenger, fails the precondition and changes nothing.
    pub async fn cancel(
        &self,
        identity: &PassengerIdentity,
        trip_id: Uuid,
    ) -> ReservationResult<CancellationReceipt> {
        let bound = Precondition::BoundTo(identity.email().to_string());
        let updated = match self
            .store
            .conditional_update(trip_id, &bound, &Mutation::ReleaseSeat)
            .await
        {
            Ok(trip) => trip,
            Err(StoreError::PreconditionFailed(_)) => {
                info!(%trip_id, passenger = %identity.masked(), "Cancel ignored: trip not reserved by caller");
                return Err(ReservationError::NotReservedByCaller(trip_id));
            }
            Err(err) => return Err(store_failure(err)),
        };

        self.annotations.remove(identity, trip_id);
        self.publish(TripEvent::SeatReleased(TripSnapshot::of(&updated)));

        info!(
            %trip_id,
            passenger = %identity.masked(),
            available_seats = updated.available_seats,
            "Reservation cancelled"
        );

        Ok(CancellationReceipt {
            trip_id,
            available_seats: updated.available_seats,
            complete: updated.complete,
            cancelled_at: Utc::now(),
        })
    }

    /// Transition: Open → Closed, at the driver's request.
    pub async fn close(&self, identity: &PassengerIdentity, trip_id: Uuid) -> ReservationResult<Trip> {
        let driven_by = Precondition::DrivenBy(identity.email().to_string());
        let updated = match self
            .store
            .conditional_update(trip_id, &driven_by, &Mutation::Close)
            .await
        {
            Ok(trip) => trip,
            Err(StoreError::PreconditionFailed(_)) => {
                warn!(%trip_id, caller = %identity.masked(), "Close rejected: caller is not the driver");
                return Err(ReservationError::NotTripDriver(trip_id));
            }
            Err(err) => return Err(store_failure(err)),
        };

        self.publish(TripEvent::TripClosed(TripSnapshot::of(&updated)));
        info!(%trip_id, driver = %identity.masked(), "Trip closed by driver");

        Ok(updated)
    }

    /// Measures the caller against the check-in radius and, when admitted,
    /// remembers where they were as the caller's own display annotation.
    /// Capacity is never touched.
    pub async fn check_in(
        &self,
        identity: &PassengerIdentity,
        trip_id: Uuid,
        location: &dyn LocationProvider,
    ) -> ReservationResult<CheckInOutcome> {
        let fence = self.geofence.check_in_fence()?;
        let trip = self.fetch(trip_id).await?;
        let observed = self.locate(location).await?;
        let check = fence.check(&observed)?;

        if check.admitted {
            self.annotations.set(identity, trip.id, observed);
            info!(%trip_id, passenger = %identity.masked(), distance_km = check.distance_km, "Check-in recorded");
        } else {
            warn!(
                %trip_id,
                passenger = %identity.masked(),
                distance_km = check.distance_km,
                threshold_km = check.threshold_km,
                "Check-in outside radius"
            );
        }

        Ok(CheckInOutcome {
            trip_id,
            distance_km: check.distance_km,
            threshold_km: check.threshold_km,
            admitted: check.admitted,
        })
    }

    async fn fetch(&self, trip_id: Uuid) -> ReservationResult<Trip> {
        retry_reads(&self.read_retry, || self.store.get(trip_id))
            .await
            .map_err(store_failure)
    }

    async fn locate(&self, provider: &dyn LocationProvider) -> ReservationResult<Coordinate> {
        let timeout = self.location_timeout;
        let coordinate = tokio::time::timeout(timeout, provider.current_coordinate(timeout))
            .await
            .map_err(|_| LocationError::TimedOut(timeout))??;
        coordinate.validate()?;
        Ok(coordinate)
    }

    fn publish(&self, event: TripEvent) {
        if let Some(sender) = &self.events {
            // No subscribers is not an error
            let _ = sender.send(event);
        }
    }
}

/// Maps store failures outside the precondition path.
pub(crate) fn store_failure(err: StoreError) -> ReservationError {
    match err {
        StoreError::NotFound(id) => ReservationError::NotFound(id),
        StoreError::Unavailable(reason) => ReservationError::StoreUnavailable(reason),
        other => {
            error!(error = %other, "Trip store failure");
            ReservationError::StoreUnavailable(other.to_string())
        }
    }
}
