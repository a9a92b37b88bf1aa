use async_trait::async_trait;
use std::time::Duration;

use crate::geo::Coordinate;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("location fix timed out after {0:?}")]
    TimedOut(Duration),
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location provider failed: {0}")]
    Unavailable(String),
}

/// Supplies the caller's position at the moment of a capacity-affecting call.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current_coordinate(&self, timeout: Duration) -> Result<Coordinate, LocationError>;
}

/// The position a client attached to its request.
///
/// A client that did not share its location is treated as having denied the
/// permission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedLocation(Option<Coordinate>);

impl ReportedLocation {
    pub fn new(coordinate: Option<Coordinate>) -> Self {
        Self(coordinate)
    }

    pub fn at(coordinate: Coordinate) -> Self {
        Self(Some(coordinate))
    }

    pub fn withheld() -> Self {
        Self(None)
    }
}

#[async_trait]
impl LocationProvider for ReportedLocation {
    async fn current_coordinate(&self, _timeout: Duration) -> Result<Coordinate, LocationError> {
        self.0.ok_or(LocationError::PermissionDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reported_location() {
        let here = Coordinate::new(-36.8265, -73.0492).unwrap();
        let provider = ReportedLocation::at(here);
        assert_eq!(provider.current_coordinate(Duration::from_secs(1)).await, Ok(here));

        let provider = ReportedLocation::withheld();
        assert_eq!(
            provider.current_coordinate(Duration::from_secs(1)).await,
            Err(LocationError::PermissionDenied)
        );
    }
}
