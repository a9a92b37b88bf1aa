//! Needs a Redis on `CARPOOL_TEST_REDIS_URL` (default `redis://127.0.0.1:6379`).
//! Run with `--ignored`.

use std::sync::Arc;

use carpool_core::{Coordinate, Mutation, Place, Precondition, StoreError, Trip, TripFilter, TripStore};
use carpool_store::RedisTripStore;

fn redis_url() -> String {
    std::env::var("CARPOOL_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn trip(seats: u32) -> Trip {
    let campus = Place::new("Duoc UC", Coordinate::new(-36.8265, -73.0492).unwrap());
    let centro = Place::new("Centro", Coordinate::new(-36.8270, -73.0503).unwrap());
    Trip::new("driver@duocuc.cl", campus, centro, "ABCD12", seats, 1500)
}

#[tokio::test]
#[ignore]
async fn test_last_seat_goes_to_one_claimant() {
    let store = Arc::new(RedisTripStore::new(&redis_url()).unwrap());
    let trip = trip(1);
    store.seed_trip(&trip).await.unwrap();
    let trip_id = trip.id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .conditional_update(
                    trip_id,
                    &Precondition::SeatOpen,
                    &Mutation::ClaimSeat { passenger_email: format!("p{}@duocuc.cl", i) },
                )
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(updated) => {
                winners += 1;
                assert_eq!(updated.available_seats, 0);
                assert!(updated.complete);
            }
            Err(StoreError::PreconditionFailed(id)) => assert_eq!(id, trip_id),
            Err(other) => panic!("unexpected store error: {other}"),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
#[ignore]
async fn test_release_and_query() {
    let store = RedisTripStore::new(&redis_url()).unwrap();
    let trip = trip(3);
    store.seed_trip(&trip).await.unwrap();

    let claimed = store
        .conditional_update(
            trip.id,
            &Precondition::SeatOpen,
            &Mutation::ClaimSeat { passenger_email: "pia@duocuc.cl".to_string() },
        )
        .await
        .unwrap();
    assert_eq!(claimed.available_seats, 2);

    let mine = store.query(&TripFilter::reserved_by("pia@duocuc.cl")).await.unwrap();
    assert!(mine.iter().any(|t| t.id == trip.id));

    let released = store
        .conditional_update(trip.id, &Precondition::BoundTo("pia@duocuc.cl".to_string()), &Mutation::ReleaseSeat)
        .await
        .unwrap();
    assert_eq!(released.available_seats, 3);
    assert_eq!(released.passenger_email, None);

    let again = store
        .conditional_update(trip.id, &Precondition::BoundTo("pia@duocuc.cl".to_string()), &Mutation::ReleaseSeat)
        .await;
    assert!(matches!(again, Err(StoreError::PreconditionFailed(_))));
}
