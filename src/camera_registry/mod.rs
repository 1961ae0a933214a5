//! CameraRegistry - camera metadata surface
//!
//! ## Responsibilities
//!
//! - Per-camera coordinates and display name
//! - Admin writes via the API, shared reads by the tracking engine
//!
//! The engine resolves metadata lazily when emitting location-bearing
//! events; a camera with no registered metadata never blocks a detection,
//! the event just carries a null location.

use crate::error::Result;
use crate::store::TrackerStore;
use crate::tracker::types::GeoLocation;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Camera metadata entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraMetadata {
    pub camera_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Camera metadata service over the shared store
pub struct CameraRegistry {
    store: Arc<dyn TrackerStore>,
}

impl CameraRegistry {
    pub fn new(store: Arc<dyn TrackerStore>) -> Self {
        Self { store }
    }

    /// Upsert metadata for a camera (admin path)
    pub async fn set_metadata(&self, meta: CameraMetadata) -> Result<CameraMetadata> {
        self.store.set_camera(&meta).await?;
        tracing::info!(
            camera_id = %meta.camera_id,
            name = %meta.name,
            "Camera metadata updated"
        );
        Ok(meta)
    }

    pub async fn get_metadata(&self, camera_id: &str) -> Result<Option<CameraMetadata>> {
        self.store.get_camera(camera_id).await
    }

    pub async fn list(&self) -> Result<Vec<CameraMetadata>> {
        self.store.list_cameras().await
    }

    /// Resolve a camera's coordinates for event emission. Unknown cameras
    /// resolve to `None` rather than an error.
    pub async fn resolve_location(&self, camera_id: &str) -> Option<GeoLocation> {
        match self.store.get_camera(camera_id).await {
            Ok(meta) => meta.map(|m| GeoLocation {
                latitude: m.latitude,
                longitude: m.longitude,
            }),
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Camera metadata lookup failed");
                None
            }
        }
    }

    /// Resolve a camera's display name for event emission
    pub async fn resolve_name(&self, camera_id: &str) -> Option<String> {
        match self.store.get_camera(camera_id).await {
            Ok(meta) => meta.map(|m| m.name),
            Err(e) => {
                tracing::warn!(camera_id = %camera_id, error = %e, "Camera metadata lookup failed");
                None
            }
        }
    }
}
