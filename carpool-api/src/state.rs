use std::sync::Arc;

use carpool_reservation::{ReservationEngine, TripListingService};
use carpool_core::TripEvent;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReservationEngine>,
    pub listing: Arc<TripListingService>,
    pub sse_tx: broadcast::Sender<TripEvent>,
    pub auth: AuthConfig,
}
