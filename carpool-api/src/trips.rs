use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use carpool_core::{
    CancellationReceipt, CheckInOutcome, Coordinate, ListedTrip, PassengerIdentity, ReportedLocation,
    ReservationReceipt, Trip, TripEvent,
};
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips", get(list_open_trips))
        .route("/v1/trips/mine", get(list_my_reservations))
        .route("/v1/trips/stream", get(trip_stream))
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/check-in", post(check_in))
        .route("/v1/trips/{id}/reservation", post(reserve_seat).delete(cancel_reservation))
        .route("/v1/trips/{id}/close", post(close_trip))
}

/// The device reading sent by the client. No body means the user declined
/// to share their location.
fn reported(body: Option<Json<Coordinate>>) -> ReportedLocation {
    ReportedLocation::new(body.map(|Json(coordinate)| coordinate))
}

async fn list_open_trips(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
) -> Result<Json<Vec<ListedTrip>>, AppError> {
    Ok(Json(state.listing.list_open_trips(&identity).await?))
}

async fn list_my_reservations(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
) -> Result<Json<Vec<ListedTrip>>, AppError> {
    Ok(Json(state.listing.list_reservations(&identity).await?))
}

async fn get_trip(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    let trip = state.engine.trip(trip_id).await?;
    Ok(Json(trip.as_seen_by(identity.email())))
}

async fn check_in(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
    Path(trip_id): Path<Uuid>,
    body: Option<Json<Coordinate>>,
) -> Result<Json<CheckInOutcome>, AppError> {
    let location = reported(body);
    Ok(Json(state.engine.check_in(&identity, trip_id, &location).await?))
}

async fn reserve_seat(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
    Path(trip_id): Path<Uuid>,
    body: Option<Json<Coordinate>>,
) -> Result<Json<ReservationReceipt>, AppError> {
    let location = reported(body);
    Ok(Json(state.engine.reserve(&identity, trip_id, &location).await?))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<CancellationReceipt>, AppError> {
    Ok(Json(state.engine.cancel(&identity, trip_id).await?))
}

async fn close_trip(
    State(state): State<AppState>,
    Extension(identity): Extension<PassengerIdentity>,
    Path(trip_id): Path<Uuid>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.engine.close(&identity, trip_id).await?))
}

/// Seat changes as they commit, so open lists can be refreshed without polling.
async fn trip_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sse_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| async move { sse_event(result).map(Ok) });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// A lagged subscriber drops the skipped events and carries on; the next
/// snapshot it receives is complete anyway.
fn sse_event(result: Result<TripEvent, BroadcastStreamRecvError>) -> Option<Event> {
    match result {
        Ok(event) => match Event::default().event(event.name()).json_data(&event) {
            Ok(sse_event) => Some(sse_event),
            Err(e) => {
                tracing::error!("Failed to encode trip event: {}", e);
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!("SSE subscriber lagged, skipped {} trip events", skipped);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lagged_subscriber_skips_without_closing() {
        assert!(sse_event(Err(BroadcastStreamRecvError::Lagged(3))).is_none());
    }
}
