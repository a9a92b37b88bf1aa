use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use carpool_core::PassengerIdentity;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

/// Roles allowed on the trip routes. Whether the caller may close a trip is
/// decided by the engine against `driver_email`, not by the role.
const TRIP_ROLES: [&str; 2] = ["PASSENGER", "DRIVER"];

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PassengerClaims {
    pub sub: String,
    pub email: String,
    pub role: String,
    pub exp: usize,
}

/// Decodes the bearer token once and hands handlers a validated
/// [`PassengerIdentity`] through request extensions.
pub async fn passenger_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(authorization) =
        bearer.ok_or_else(|| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<PassengerClaims>(
        authorization.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::AuthenticationError("Invalid or expired token".to_string())
    })?;

    if !TRIP_ROLES.contains(&token_data.claims.role.as_str()) {
        return Err(AppError::AuthorizationError(format!(
            "Role {} may not use trip routes",
            token_data.claims.role
        )));
    }

    let identity = PassengerIdentity::new(token_data.claims.email.clone()).map_err(|e| {
        tracing::warn!("Token for {} carries no usable email: {}", token_data.claims.sub, e);
        AppError::AuthenticationError("Token carries no usable e-mail".to_string())
    })?;

    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(token_data.claims);

    Ok(next.run(req).await)
}
