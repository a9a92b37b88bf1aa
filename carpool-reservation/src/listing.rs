use std::sync::Arc;
use tracing::debug;

use carpool_core::{
    AnnotationCache, ListedTrip, PassengerIdentity, ReservationResult, Trip, TripFilter,
    TripStore,
};

use crate::engine::store_failure;
use crate::retry::{retry_reads, RetryPolicy};

/// Read-side view of trips for browsing. Only the caller's own annotations are
/// merged in, for display; nothing here feeds back into a reservation decision.
pub struct TripListingService {
    store: Arc<dyn TripStore>,
    annotations: Arc<dyn AnnotationCache>,
    read_retry: RetryPolicy,
}

impl TripListingService {
    pub fn new(store: Arc<dyn TripStore>, annotations: Arc<dyn AnnotationCache>) -> Self {
        Self {
            store,
            annotations,
            read_retry: RetryPolicy::default(),
        }
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    /// Open trips the caller is not already bound to.
    pub async fn list_open_trips(&self, caller: &PassengerIdentity) -> ReservationResult<Vec<ListedTrip>> {
        let filter = TripFilter::open_for(caller.email());
        let snapshot = self.fetch(&filter).await?;
        Ok(self.apply_snapshot(caller, snapshot, &filter))
    }

    /// Trips the caller currently holds a seat on.
    pub async fn list_reservations(&self, caller: &PassengerIdentity) -> ReservationResult<Vec<ListedTrip>> {
        let filter = TripFilter::reserved_by(caller.email());
        let snapshot = self.fetch(&filter).await?;
        Ok(self.apply_snapshot(caller, snapshot, &filter))
    }

    /// Builds `caller`'s listing from one complete snapshot of trips.
    ///
    /// The output depends only on `snapshot` and the caller's annotations, so a
    /// pushed snapshot replaces the previous listing outright. Other
    /// passengers' e-mails are masked.
    pub fn apply_snapshot(
        &self,
        caller: &PassengerIdentity,
        snapshot: Vec<Trip>,
        filter: &TripFilter,
    ) -> Vec<ListedTrip> {
        let listed: Vec<ListedTrip> = snapshot
            .into_iter()
            .filter(|trip| filter.matches(trip))
            .map(|trip| ListedTrip {
                annotation: self.annotations.get(caller, trip.id),
                trip: trip.as_seen_by(caller.email()),
            })
            .collect();
        debug!(count = listed.len(), "Listing built from snapshot");
        listed
    }

    async fn fetch(&self, filter: &TripFilter) -> ReservationResult<Vec<Trip>> {
        retry_reads(&self.read_retry, || self.store.query(filter))
            .await
            .map_err(store_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryTripStore;
    use carpool_core::{Coordinate, InMemoryAnnotationCache, Mutation, Place, Precondition};

    fn trip(seats: u32) -> Trip {
        let campus = Place::new("Duoc UC", Coordinate::new(-36.8265, -73.0492).unwrap());
        let centro = Place::new("Centro", Coordinate::new(-36.8270, -73.0503).unwrap());
        Trip::new("driver@duocuc.cl", campus, centro, "ABCD12", seats, 1500)
    }

    fn caller() -> PassengerIdentity {
        PassengerIdentity::new("p@duocuc.cl").unwrap()
    }

    #[tokio::test]
    async fn test_open_listing_skips_full_and_own_trips() {
        let store = Arc::new(InMemoryTripStore::new());
        let annotations = Arc::new(InMemoryAnnotationCache::new());
        let open = store.insert(trip(3)).await;
        store.insert(trip(0)).await;
        let mine = store.insert(trip(2)).await;
        let claim = Mutation::ClaimSeat { passenger_email: caller().email().to_string() };
        store.conditional_update(mine, &Precondition::SeatOpen, &claim).await.unwrap();

        let spot = Coordinate::new(-36.8266, -73.0490).unwrap();
        annotations.set(&caller(), open, spot);

        let service = TripListingService::new(store.clone(), annotations.clone());
        let listed = service.list_open_trips(&caller()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].trip.id, open);
        assert_eq!(listed[0].annotation, Some(spot));

        let reservations = service.list_reservations(&caller()).await.unwrap();
        assert_eq!(reservations.len(), 1);
        assert_eq!(reservations[0].trip.id, mine);
        assert_eq!(reservations[0].annotation, None);
    }

    #[tokio::test]
    async fn test_snapshot_replaces_previous_listing() {
        let store = Arc::new(InMemoryTripStore::new());
        let service = TripListingService::new(store, Arc::new(InMemoryAnnotationCache::new()));
        let filter = TripFilter::open_for("p@duocuc.cl");

        let first = service.apply_snapshot(&caller(), vec![trip(2), trip(3)], &filter);
        assert_eq!(first.len(), 2);

        let mut closed = first[0].trip.clone();
        closed.complete = true;
        let second = service.apply_snapshot(&caller(), vec![closed], &filter);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_other_passengers_fix_and_email_stay_hidden() {
        let store = Arc::new(InMemoryTripStore::new());
        let annotations = Arc::new(InMemoryAnnotationCache::new());
        let ana = PassengerIdentity::new("ana@duocuc.cl").unwrap();
        let bruno = PassengerIdentity::new("bruno@duocuc.cl").unwrap();

        let id = store.insert(trip(4)).await;
        let claim = Mutation::ClaimSeat { passenger_email: ana.email().to_string() };
        store.conditional_update(id, &Precondition::SeatOpen, &claim).await.unwrap();
        annotations.set(&ana, id, Coordinate::new(-36.8221, -73.0491).unwrap());

        let service = TripListingService::new(store, annotations);
        let listed = service.list_open_trips(&bruno).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].annotation, None);
        assert_eq!(listed[0].trip.passenger_email.as_deref(), Some("a***@duocuc.cl"));

        let mine = service.list_reservations(&ana).await.unwrap();
        assert_eq!(mine[0].trip.passenger_email.as_deref(), Some("ana@duocuc.cl"));
        assert!(mine[0].annotation.is_some());
    }

    #[test]
    fn test_listed_trip_flattens_on_the_wire() {
        let listed = ListedTrip { trip: trip(2), annotation: None };
        let json = serde_json::to_value(&listed).unwrap();
        assert_eq!(json["available_seats"], 2);
        assert!(json["annotation"].is_null());
    }
}
