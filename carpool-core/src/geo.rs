use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("latitude {0} is not a finite value in [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is not a finite value in [-180, 180]")]
    InvalidLongitude(f64),
    #[error("threshold {0} km is not a finite, non-negative distance")]
    InvalidThreshold(f64),
}

/// A WGS84 point in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, GeoError> {
        let coordinate = Self { lat, lng };
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Fields are public, so values deserialized from requests or storage are
    /// checked here before any distance is computed from them.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(GeoError::InvalidLatitude(self.lat));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(GeoError::InvalidLongitude(self.lng));
        }
        Ok(())
    }

    /// Great-circle distance in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> Result<f64, GeoError> {
        haversine_km(self, other)
    }
}

/// A labelled point: trip endpoints and the service's reference location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub label: String,
    pub coordinate: Coordinate,
}

impl Place {
    pub fn new(label: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            label: label.into(),
            coordinate,
        }
    }
}

pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> Result<f64, GeoError> {
    a.validate()?;
    b.validate()?;

    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    Ok(EARTH_RADIUS_KM * c)
}

/// True iff `observed` lies within `threshold_km` of `reference`, boundary included.
pub fn is_within_range(
    observed: &Coordinate,
    reference: &Coordinate,
    threshold_km: f64,
) -> Result<bool, GeoError> {
    Ok(Geofence::new(*reference, threshold_km)?.check(observed)?.admitted)
}

/// Result of measuring one observation against a geofence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProximityCheck {
    pub distance_km: f64,
    pub threshold_km: f64,
    pub admitted: bool,
}

/// A circle of `threshold_km` around a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geofence {
    reference: Coordinate,
    threshold_km: f64,
}

impl Geofence {
    pub fn new(reference: Coordinate, threshold_km: f64) -> Result<Self, GeoError> {
        reference.validate()?;
        if !threshold_km.is_finite() || threshold_km < 0.0 {
            return Err(GeoError::InvalidThreshold(threshold_km));
        }
        Ok(Self {
            reference,
            threshold_km,
        })
    }

    pub fn reference(&self) -> Coordinate {
        self.reference
    }

    pub fn threshold_km(&self) -> f64 {
        self.threshold_km
    }

    pub fn check(&self, observed: &Coordinate) -> Result<ProximityCheck, GeoError> {
        let distance_km = haversine_km(observed, &self.reference)?;
        Ok(ProximityCheck {
            distance_km,
            threshold_km: self.threshold_km,
            admitted: distance_km <= self.threshold_km,
        })
    }
}

/// The fixed reference location and the two radii measured against it.
///
/// `reservation_threshold_km` gates `reserve`, the only capacity-affecting
/// call site. `check_in_threshold_km` gates `check_in`, which only records an
/// advisory annotation. They are configured independently on purpose: a
/// shared value would change who gets admitted at one of the two sites.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofencePolicy {
    pub reference: Place,
    pub reservation_threshold_km: f64,
    pub check_in_threshold_km: f64,
}

impl GeofencePolicy {
    pub fn reservation_fence(&self) -> Result<Geofence, GeoError> {
        Geofence::new(self.reference.coordinate, self.reservation_threshold_km)
    }

    pub fn check_in_fence(&self) -> Result<Geofence, GeoError> {
        Geofence::new(self.reference.coordinate, self.check_in_threshold_km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campus() -> Coordinate {
        Coordinate::new(-36.8265, -73.0492).unwrap()
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(haversine_km(&campus(), &campus()).unwrap(), 0.0);
    }

    #[test]
    fn test_concepcion_to_santiago() {
        let santiago = Coordinate::new(-33.4489, -70.6693).unwrap();
        let distance = haversine_km(&campus(), &santiago).unwrap();
        // Roughly 430 km as the crow flies
        assert!(distance > 400.0 && distance < 460.0, "got {distance}");
    }

    #[test]
    fn test_half_kilometre_north() {
        let nearby = Coordinate::new(-36.8220, -73.0492).unwrap();
        let distance = haversine_km(&nearby, &campus()).unwrap();
        assert!((distance - 0.5).abs() < 0.01, "got {distance}");
        assert!(is_within_range(&nearby, &campus(), 1.0).unwrap());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let observed = Coordinate::new(-36.8200, -73.0400).unwrap();
        let exact = haversine_km(&observed, &campus()).unwrap();

        assert!(is_within_range(&observed, &campus(), exact).unwrap());
        assert!(!is_within_range(&observed, &campus(), exact - 1e-9).unwrap());
    }

    #[test]
    fn test_nan_is_rejected() {
        let bad = Coordinate { lat: f64::NAN, lng: -73.0 };
        assert!(matches!(
            is_within_range(&bad, &campus(), 1.0),
            Err(GeoError::InvalidLatitude(_))
        ));

        let bad = Coordinate { lat: -36.0, lng: f64::NAN };
        assert!(matches!(
            haversine_km(&campus(), &bad),
            Err(GeoError::InvalidLongitude(_))
        ));
    }

    #[test]
    fn test_out_of_range_degrees_are_rejected() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        assert_eq!(
            Geofence::new(campus(), -1.0),
            Err(GeoError::InvalidThreshold(-1.0))
        );
        assert!(Geofence::new(campus(), f64::NAN).is_err());
    }

    #[test]
    fn test_policy_keeps_thresholds_apart() {
        let policy = GeofencePolicy {
            reference: Place::new("Duoc UC Concepción", campus()),
            reservation_threshold_km: 1.0,
            check_in_threshold_km: 100.0,
        };
        let five_km = Coordinate::new(-36.7815, -73.0492).unwrap();

        assert!(!policy.reservation_fence().unwrap().check(&five_km).unwrap().admitted);
        assert!(policy.check_in_fence().unwrap().check(&five_km).unwrap().admitted);
    }
}
