//! Application state
//!
//! Holds the startup configuration and the shared components

use crate::camera_registry::CameraRegistry;
use crate::error::{Error, Result};
use crate::event_log::EventLogService;
use crate::store::{StoreBackend, TrackerStore};
use crate::tracker::{TrackerConfig, VehicleTracker};
use std::sync::Arc;
use std::time::Duration;

/// Application configuration, read once at startup and never mutated
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Store backend selection; no runtime fallback between backends
    pub store_backend: StoreBackend,
    /// Database URL, required for the mysql backend
    pub database_url: Option<String>,
    /// Tracking window after the last accepted detection
    pub tracking_window: Duration,
    /// Camera carrying exit semantics
    pub entry_camera: String,
    /// Reaper poll interval, strictly shorter than the tracking window
    pub reaper_poll_interval: Duration,
    /// Archive retention
    pub archive_retention: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let backend_raw =
            std::env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());
        let store_backend = StoreBackend::parse(&backend_raw).ok_or_else(|| {
            Error::Config(format!(
                "Unknown STORE_BACKEND '{}' (expected 'memory' or 'mysql')",
                backend_raw
            ))
        })?;

        let database_url = std::env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::MySql && database_url.is_none() {
            return Err(Error::Config(
                "STORE_BACKEND=mysql requires DATABASE_URL".to_string(),
            ));
        }

        let window_seconds = env_u64("TRACKER_WINDOW_SECONDS", 30);
        let reaper_seconds = env_u64("REAPER_POLL_INTERVAL_SECONDS", 2);
        if reaper_seconds >= window_seconds {
            return Err(Error::Config(format!(
                "REAPER_POLL_INTERVAL_SECONDS ({}) must be shorter than TRACKER_WINDOW_SECONDS ({})",
                reaper_seconds, window_seconds
            )));
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            store_backend,
            database_url,
            tracking_window: Duration::from_secs(window_seconds),
            entry_camera: std::env::var("ENTRY_CAMERA")
                .unwrap_or_else(|_| "camera1".to_string()),
            reaper_poll_interval: Duration::from_secs(reaper_seconds),
            archive_retention: Duration::from_secs(env_u64("ARCHIVE_RETENTION_HOURS", 12) * 3600),
        })
    }

    /// Engine settings derived from the application config
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            window: self.tracking_window,
            entry_camera: self.entry_camera.clone(),
            archive_retention: self.archive_retention,
            ..TrackerConfig::default()
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Shared tracking store
    pub store: Arc<dyn TrackerStore>,
    /// Tracking engine
    pub tracker: Arc<VehicleTracker>,
    /// Camera metadata surface
    pub cameras: Arc<CameraRegistry>,
    /// Emitted-event ring buffer
    pub event_log: Arc<EventLogService>,
}
