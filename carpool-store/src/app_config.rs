use carpool_core::{Coordinate, GeoError, GeofencePolicy, Place};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub geofence: GeofenceConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    #[serde(default)]
    pub run_migrations: bool,
}

/// Reference point plus the two radii measured against it.
#[derive(Debug, Deserialize, Clone)]
pub struct GeofenceConfig {
    pub reference_label: String,
    pub reference_lat: f64,
    pub reference_lng: f64,
    /// Gate for `reserve`.
    #[serde(default = "default_reservation_threshold")]
    pub reservation_threshold_km: f64,
    /// Gate for `check_in`; annotation only.
    #[serde(default = "default_check_in_threshold")]
    pub check_in_threshold_km: f64,
}

fn default_reservation_threshold() -> f64 { 1.0 }
fn default_check_in_threshold() -> f64 { 100.0 }

impl GeofenceConfig {
    pub fn policy(&self) -> Result<GeofencePolicy, GeoError> {
        let reference = Coordinate::new(self.reference_lat, self.reference_lng)?;
        let policy = GeofencePolicy {
            reference: Place::new(self.reference_label.clone(), reference),
            reservation_threshold_km: self.reservation_threshold_km,
            check_in_threshold_km: self.check_in_threshold_km,
        };
        // Reject bad thresholds at startup rather than on the first request
        policy.reservation_fence()?;
        policy.check_in_fence()?;
        Ok(policy)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocationConfig {
    pub timeout_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000 }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local, untracked overrides
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `CARPOOL_STORAGE__BACKEND=redis`
            .add_source(config::Environment::with_prefix("CARPOOL").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [server]
        port = 8080

        [auth]
        jwt_secret = "test-secret"

        [storage]
        backend = "memory"

        [geofence]
        reference_label = "Duoc UC Concepción"
        reference_lat = -36.8265
        reference_lng = -73.0492
    "#;

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = Config::from_toml(MINIMAL).expect("config should parse");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.location.timeout(), Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 3);

        let policy = config.geofence.policy().unwrap();
        assert_eq!(policy.reservation_threshold_km, 1.0);
        assert_eq!(policy.check_in_threshold_km, 100.0);
        assert_eq!(policy.reference.coordinate.lat, -36.8265);
    }

    #[test]
    fn test_bad_reference_is_rejected() {
        let source = MINIMAL.replace("reference_lat = -36.8265", "reference_lat = -136.8");
        let config = Config::from_toml(&source).unwrap();
        assert!(config.geofence.policy().is_err());
    }

    #[test]
    fn test_negative_threshold_is_rejected() {
        let source = format!("{MINIMAL}\nreservation_threshold_km = -2.0\n");
        let config = Config::from_toml(&source).unwrap();
        assert!(matches!(config.geofence.policy(), Err(GeoError::InvalidThreshold(_))));
    }
}
