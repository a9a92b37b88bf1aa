use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use carpool_core::ReservationError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    Reservation(ReservationError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Reservation(err) => {
                let status = reservation_status(&err);
                if status == StatusCode::SERVICE_UNAVAILABLE {
                    tracing::error!("Trip store unavailable: {}", err);
                    (status, "Trip store unavailable, try again".to_string())
                } else {
                    (status, err.to_string())
                }
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

fn reservation_status(err: &ReservationError) -> StatusCode {
    match err {
        ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
        ReservationError::TripFull(_)
        | ReservationError::SeatNoLongerAvailable(_)
        | ReservationError::NotReservedByCaller(_) => StatusCode::CONFLICT,
        ReservationError::OutOfRange { .. } | ReservationError::NotTripDriver(_) => StatusCode::FORBIDDEN,
        ReservationError::LocationUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReservationError::InvalidCoordinate(_) => StatusCode::BAD_REQUEST,
        ReservationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        Self::Reservation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_conflicts_and_geofence_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(reservation_status(&ReservationError::TripFull(id)), StatusCode::CONFLICT);
        assert_eq!(
            reservation_status(&ReservationError::SeatNoLongerAvailable(id)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            reservation_status(&ReservationError::OutOfRange { distance_km: 5.0, threshold_km: 1.0 }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            reservation_status(&ReservationError::LocationUnavailable("denied".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_auth_failures_map_to_401_and_403() {
        let unauthorized = AppError::AuthenticationError("Missing bearer token".into()).into_response();
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
        let forbidden = AppError::AuthorizationError("Role ADMIN may not use trip routes".into()).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_store_failure_hides_details() {
        let response = AppError::from(ReservationError::StoreUnavailable("connection reset by 10.0.0.3".into()))
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
