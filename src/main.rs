//! ANPR Trackserver
//!
//! Main entry point for the tracking server.

use anpr_trackserver::{
    camera_registry::CameraRegistry,
    event_log::EventLogService,
    notifier::{Notifier, NotifierConfig},
    state::{AppConfig, AppState},
    store::{MemoryStore, MySqlStore, StoreBackend, TrackerStore},
    timer_reaper::TimerReaper,
    tracker::VehicleTracker,
    web_api,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anpr_trackserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ANPR Trackserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        store_backend = %config.store_backend.as_str(),
        tracking_window_sec = config.tracking_window.as_secs(),
        entry_camera = %config.entry_camera,
        reaper_poll_interval_sec = config.reaper_poll_interval.as_secs(),
        archive_retention_sec = config.archive_retention.as_secs(),
        "Configuration loaded"
    );

    // Select the store backend. A configured shared store that is
    // unreachable is a startup failure, never a fallback to memory.
    let store: Arc<dyn TrackerStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store (single instance)");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::MySql => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required for mysql backend"))?;
            let pool = MySqlPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await?;
            let store = MySqlStore::new(pool);
            store.init_schema().await?;
            tracing::info!("Using MySQL store (shared)");
            Arc::new(store)
        }
    };

    // Initialize components
    let cameras = Arc::new(CameraRegistry::new(store.clone()));
    let event_log = Arc::new(EventLogService::new(2000));

    let notifier_config = NotifierConfig::from_env();
    if notifier_config.any_channel() {
        tracing::info!("Notification channels configured");
    } else {
        tracing::info!("No notification channels configured, events are log-only");
    }
    let notifier = Arc::new(Notifier::new(notifier_config));

    let tracker = Arc::new(VehicleTracker::new(
        store.clone(),
        cameras.clone(),
        event_log.clone(),
        notifier,
        config.tracker_config(),
    ));
    tracing::info!("VehicleTracker initialized");

    // Start the expiry reaper
    let reaper = TimerReaper::new(tracker.clone(), store.clone(), config.reaper_poll_interval);
    reaper.start().await;

    let state = AppState {
        config: config.clone(),
        store,
        tracker,
        cameras,
        event_log,
    };

    let app = web_api::create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Trackserver listening");

    axum::serve(listener, app).await?;

    Ok(())
}
