use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use carpool_core::{Mutation, Precondition, StoreError, Trip, TripFilter, TripStore};

/// Process-local trip store.
///
/// Conditional updates hold the write guard across check and mutation, which
/// gives the same all-or-nothing behaviour a document store's transaction does.
#[derive(Debug, Default)]
pub struct InMemoryTripStore {
    trips: RwLock<HashMap<Uuid, Trip>>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a trip as the driver flow would have posted it.
    pub async fn insert(&self, trip: Trip) -> Uuid {
        let id = trip.id;
        self.trips.write().await.insert(id, trip);
        id
    }

    pub async fn len(&self) -> usize {
        self.trips.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.trips.read().await.is_empty()
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn get(&self, id: Uuid) -> Result<Trip, StoreError> {
        self.trips
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        precondition: &Precondition,
        mutation: &Mutation,
    ) -> Result<Trip, StoreError> {
        let mut trips = self.trips.write().await;
        let trip = trips.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !precondition.holds(trip) {
            return Err(StoreError::PreconditionFailed(id));
        }
        let next = mutation.apply(trip).ok_or(StoreError::PreconditionFailed(id))?;
        *trip = next.clone();
        Ok(next)
    }

    async fn query(&self, filter: &TripFilter) -> Result<Vec<Trip>, StoreError> {
        let mut trips: Vec<Trip> = self
            .trips
            .read()
            .await
            .values()
            .filter(|trip| filter.matches(trip))
            .cloned()
            .collect();
        trips.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(trips)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpool_core::{Coordinate, Place};

    fn trip(seats: u32) -> Trip {
        let campus = Place::new("Duoc UC", Coordinate::new(-36.8265, -73.0492).unwrap());
        let centro = Place::new("Centro", Coordinate::new(-36.8270, -73.0503).unwrap());
        Trip::new("driver@duocuc.cl", campus, centro, "ABCD12", seats, 1500)
    }

    #[tokio::test]
    async fn test_seat_lifecycle() {
        let store = InMemoryTripStore::new();
        let id = store.insert(trip(2)).await;
        let claim = Mutation::ClaimSeat { passenger_email: "p@duocuc.cl".to_string() };

        let reserved = store.conditional_update(id, &Precondition::SeatOpen, &claim).await.unwrap();
        assert_eq!(reserved.available_seats, 1);
        assert_eq!(store.get(id).await.unwrap(), reserved);

        // Second claim loses: the trip is already bound
        let again = store.conditional_update(id, &Precondition::SeatOpen, &claim).await;
        assert_eq!(again, Err(StoreError::PreconditionFailed(id)));
        assert_eq!(store.get(id).await.unwrap().available_seats, 1);

        let bound = Precondition::BoundTo("p@duocuc.cl".to_string());
        let released = store.conditional_update(id, &bound, &Mutation::ReleaseSeat).await.unwrap();
        assert_eq!(released.available_seats, 2);
        assert_eq!(released.passenger_email, None);
    }

    #[tokio::test]
    async fn test_missing_trip() {
        let store = InMemoryTripStore::new();
        let id = Uuid::new_v4();
        assert_eq!(store.get(id).await, Err(StoreError::NotFound(id)));
        assert_eq!(
            store.conditional_update(id, &Precondition::SeatOpen, &Mutation::Close).await,
            Err(StoreError::NotFound(id))
        );
    }

    #[tokio::test]
    async fn test_query_applies_filter() {
        let store = InMemoryTripStore::new();
        store.insert(trip(3)).await;
        store.insert(trip(0)).await;

        let open = store.query(&TripFilter::open_for("p@duocuc.cl")).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(store.query(&TripFilter::default()).await.unwrap().len(), 2);
        assert_eq!(store.len().await, 2);
    }
}
