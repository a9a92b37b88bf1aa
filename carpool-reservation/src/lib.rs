pub mod engine;
pub mod listing;
pub mod memory;
pub mod retry;

pub use engine::ReservationEngine;
pub use listing::TripListingService;
pub use memory::InMemoryTripStore;
pub use retry::{retry_reads, RetryPolicy};
