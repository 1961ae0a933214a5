//! TrackerStore - shared state capability interface
//!
//! ## Responsibilities
//!
//! - Keyed access to the per-plate record and timer key families
//! - Optimistic concurrency via versioned compare-and-set
//! - Archive family with fixed-duration retention
//! - Camera metadata family (shared-read, admin-write)
//!
//! Two implementations, selected once at startup: [`MemoryStore`] for
//! single-process deployments and [`MySqlStore`] for multiple backend
//! instances sharing state. If the shared backend is configured but
//! unreachable, operations fail with [`Error::Store`]; there is no runtime
//! fallback between backends.

mod memory;
mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

use crate::camera_registry::CameraMetadata;
use crate::error::Result;
use crate::tracker::types::VehicleRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Store backend selection, from `STORE_BACKEND`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    MySql,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "mysql" => Some(Self::MySql),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::MySql => "mysql",
        }
    }
}

/// Active record paired with its store version, the compare-and-set token
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub record: VehicleRecord,
    pub version: u64,
}

/// Archived snapshot of a terminal tracking episode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedVehicle {
    pub episode_id: Uuid,
    pub plate: String,
    pub record: VehicleRecord,
    pub archived_at: DateTime<Utc>,
}

/// Shared tracking state behind the engine, the reaper, and the query
/// surface.
///
/// Record writes are guarded by a per-plate version: `update_record` and
/// `remove_record` apply only when the caller's `expected_version` matches
/// the stored one, returning `false` otherwise. Callers must re-read and
/// recompute on a `false` return, never re-apply a transition computed
/// against stale data.
#[async_trait]
pub trait TrackerStore: Send + Sync {
    // ========================================
    // Record key family
    // ========================================

    async fn get_record(&self, plate: &str) -> Result<Option<VersionedRecord>>;

    /// Create the active record for a plate. Returns `false` if one already
    /// exists (a concurrent creation won).
    async fn insert_record(&self, record: &VehicleRecord) -> Result<bool>;

    /// Compare-and-set replace. Returns `false` on version mismatch or
    /// missing record.
    async fn update_record(&self, expected_version: u64, record: &VehicleRecord) -> Result<bool>;

    /// Compare-and-set removal, used for terminal transitions. Returns
    /// `false` on version mismatch or missing record.
    async fn remove_record(&self, plate: &str, expected_version: u64) -> Result<bool>;

    async fn list_records(&self) -> Result<Vec<VersionedRecord>>;

    // ========================================
    // Timer key family
    // ========================================

    /// Arm (or re-arm) the plate's timer to the full window
    async fn arm_timer(&self, plate: &str, window: Duration) -> Result<()>;

    async fn cancel_timer(&self, plate: &str) -> Result<()>;

    /// Remaining TTL of the plate's timer. `None` when the timer is absent
    /// or already expired - for an active record that is the expiry signal.
    async fn timer_remaining(&self, plate: &str) -> Result<Option<Duration>>;

    /// Plates whose record is still active while the timer is absent or
    /// expired. The reaper polls this.
    async fn scan_expired(&self) -> Result<Vec<String>>;

    // ========================================
    // Archive key family
    // ========================================

    /// Write-once insert of a terminal record snapshot, retained for
    /// `retention` from now.
    async fn archive_record(&self, record: &VehicleRecord, retention: Duration) -> Result<()>;

    /// Archived episodes for a plate still within retention, newest first
    async fn archived_episodes(&self, plate: &str) -> Result<Vec<ArchivedVehicle>>;

    /// Drop archive entries past retention. Returns the number removed.
    async fn purge_archive(&self) -> Result<u64>;

    // ========================================
    // Camera metadata family
    // ========================================

    async fn set_camera(&self, meta: &CameraMetadata) -> Result<()>;

    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraMetadata>>;

    async fn list_cameras(&self) -> Result<Vec<CameraMetadata>>;
}
