use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use carpool_api::{app, state::{AppState, AuthConfig}};
use carpool_core::{InMemoryAnnotationCache, TripStore};
use carpool_reservation::{InMemoryTripStore, ReservationEngine, RetryPolicy, TripListingService};
use carpool_store::app_config::{Config, RetryConfig, StorageBackend, StorageConfig};
use carpool_store::{DbClient, PostgresTripStore, RedisTripStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carpool_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Carpool API on port {}", config.server.port);

    let geofence = config.geofence.policy().context("Invalid geofence configuration")?;
    tracing::info!(
        "Geofence around {}: reserve within {} km, check in within {} km",
        geofence.reference.label,
        geofence.reservation_threshold_km,
        geofence.check_in_threshold_km
    );

    let store = connect_store(&config.storage).await?;
    let annotations = Arc::new(InMemoryAnnotationCache::new());
    let read_retry = retry_policy(&config.retry);

    // SSE Broadcast Channel
    let (sse_tx, _) = tokio::sync::broadcast::channel(100);

    let engine = ReservationEngine::new(store.clone(), annotations.clone(), geofence)
        .with_location_timeout(config.location.timeout())
        .with_read_retry(read_retry.clone())
        .with_events(sse_tx.clone());
    let listing = TripListingService::new(store, annotations).with_read_retry(read_retry);

    let app_state = AppState {
        engine: Arc::new(engine),
        listing: Arc::new(listing),
        sse_tx,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn TripStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory trip store; trips are lost on restart");
            Ok(Arc::new(InMemoryTripStore::new()))
        }
        StorageBackend::Redis => {
            let url = storage
                .redis_url
                .as_deref()
                .context("storage.redis_url is required for the redis backend")?;
            let store = RedisTripStore::new(url).context("Invalid Redis URL")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Postgres => {
            let url = storage
                .database_url
                .as_deref()
                .context("storage.database_url is required for the postgres backend")?;
            let db = DbClient::new(url).await.context("Failed to connect to Postgres")?;
            if storage.run_migrations {
                db.migrate().await.context("Failed to run migrations")?;
            }
            Ok(Arc::new(PostgresTripStore::new(&db)))
        }
    }
}

fn retry_policy(retry: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: retry.max_retries,
        initial_delay: Duration::from_millis(retry.initial_delay_ms),
        max_delay: Duration::from_millis(retry.max_delay_ms),
        ..RetryPolicy::default()
    }
}
