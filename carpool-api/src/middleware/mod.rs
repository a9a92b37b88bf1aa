pub mod auth;

pub use auth::{passenger_auth_middleware, PassengerClaims};
