//! VehicleTracker - the tracking engine
//!
//! ## Responsibilities
//!
//! - Apply the state-machine transition rules to incoming detections
//! - Manage the per-vehicle expiry timer
//! - Emit domain events (entry, movement, exit, last-seen)
//! - Query surface for active vehicles and archived episodes
//!
//! ## Concurrency
//!
//! Detection handling and expiry handling both run read -> compute ->
//! compare-and-set loops against the shared store. On a CAS miss the full
//! rule evaluation restarts from a fresh read; a transition computed
//! against stale data is never applied. Terminal transitions are guarded
//! CAS removals, so the reaper, a push handler and a racing detection can
//! never archive the same episode twice. Distinct plates share nothing.
//!
//! Detections are applied in arrival order; "last seen" means
//! last-processed, not last-by-timestamp.

pub mod types;

use crate::camera_registry::CameraRegistry;
use crate::error::{Error, Result};
use crate::event_log::EventLogService;
use crate::notifier::Notifier;
use crate::store::{ArchivedVehicle, TrackerStore, VersionedRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use types::{
    DetectAction, DetectOutcome, EntryEvent, ExitEvent, ExpiryOutcome, LastSeenEvent, MovedEvent,
    PathEntry, TrackEvent, VehicleRecord, VehicleSnapshot, VehicleStatus,
};

/// Two detections at the same camera closer than this are one sighting
const DEDUP_WINDOW_MS: i64 = 500;

/// Tracking engine settings, read once at startup
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Window after the last accepted detection before a vehicle is
    /// considered stopped
    pub window: Duration,
    /// Camera carrying exit semantics (single-entrance topology)
    pub entry_camera: String,
    /// Retention of archived episodes
    pub archive_retention: Duration,
    /// CAS retry budget before the detection is reported as a conflict
    pub max_cas_retries: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
            entry_camera: "camera1".to_string(),
            archive_retention: Duration::from_secs(12 * 3600),
            max_cas_retries: 5,
        }
    }
}

/// Vehicle tracking engine over the shared store
pub struct VehicleTracker {
    store: Arc<dyn TrackerStore>,
    cameras: Arc<CameraRegistry>,
    event_log: Arc<EventLogService>,
    notifier: Arc<Notifier>,
    config: TrackerConfig,
}

impl VehicleTracker {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        cameras: Arc<CameraRegistry>,
        event_log: Arc<EventLogService>,
        notifier: Arc<Notifier>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            cameras,
            event_log,
            notifier,
            config,
        }
    }

    /// Normalize a license plate: uppercase, spaces removed
    pub fn normalize_plate(plate: &str) -> String {
        plate.trim().to_uppercase().replace(' ', "")
    }

    pub fn is_entry_camera(&self, camera_id: &str) -> bool {
        camera_id == self.config.entry_camera
    }

    fn window_chrono(&self) -> ChronoDuration {
        ChronoDuration::milliseconds(self.config.window.as_millis() as i64)
    }

    /// Handle one detection event.
    ///
    /// Returns the action taken once the transition is durably committed;
    /// a [`Error::Conflict`] after the retry budget is retriable by the
    /// caller.
    pub async fn on_detect(
        &self,
        plate_raw: &str,
        camera_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<DetectOutcome> {
        let plate = Self::normalize_plate(plate_raw);
        if plate.is_empty() {
            return Err(Error::Validation("Plate must not be empty".to_string()));
        }
        if camera_id.trim().is_empty() {
            return Err(Error::Validation("Camera id must not be empty".to_string()));
        }

        for attempt in 0..self.config.max_cas_retries {
            if attempt > 0 {
                tracing::debug!(plate = %plate, attempt = attempt, "Retrying detection after CAS miss");
            }

            let versioned = match self.store.get_record(&plate).await? {
                Some(v) => v,
                None => {
                    match self.start_episode(&plate, camera_id, ts).await? {
                        Some(outcome) => return Ok(outcome),
                        // Lost the creation race; re-evaluate
                        None => continue,
                    }
                }
            };

            // Record active but timer gone: the window lapsed without the
            // expiry transition having run yet. Apply it first; the current
            // detection then starts a fresh episode.
            if self.store.timer_remaining(&plate).await?.is_none() {
                self.apply_expiry(&versioned).await?;
                continue;
            }

            let rec = &versioned.record;

            if camera_id == rec.last_seen_camera
                && (ts - rec.last_seen_at).num_milliseconds() < DEDUP_WINDOW_MS
            {
                tracing::debug!(plate = %plate, camera_id = %camera_id, "Duplicate detection ignored");
                return Ok(DetectOutcome {
                    action: DetectAction::Duplicate,
                    plate,
                    status: None,
                    last_seen_camera: None,
                    path: None,
                    message: "Duplicate detection ignored".to_string(),
                });
            }

            if camera_id == rec.last_seen_camera {
                // Re-detection at the entry camera with a single-entry path
                // means the vehicle left the way it came in
                if self.is_entry_camera(camera_id)
                    && rec.path_history.len() == 1
                    && (ts - rec.first_seen_at) <= self.window_chrono()
                {
                    match self.finish_exit(&versioned, ts).await? {
                        Some(outcome) => return Ok(outcome),
                        None => continue,
                    }
                }

                // Same camera, no camera change: silent refresh
                let mut updated = rec.clone();
                updated.last_seen_at = ts;
                updated.detection_count += 1;

                if !self.store.update_record(versioned.version, &updated).await? {
                    continue;
                }
                self.store.arm_timer(&plate, self.config.window).await?;

                tracing::debug!(
                    plate = %plate,
                    camera_id = %camera_id,
                    detections = updated.detection_count,
                    "Same-camera detection refreshed"
                );
                return Ok(DetectOutcome {
                    action: DetectAction::UpdateSameCamera,
                    plate,
                    status: Some(updated.status),
                    last_seen_camera: Some(updated.last_seen_camera),
                    path: None,
                    message: "Updated same camera detection".to_string(),
                });
            }

            // Different camera: movement
            let mut updated = rec.clone();
            updated.path_history.push(PathEntry {
                camera_id: camera_id.to_string(),
                ts,
            });
            updated.status = VehicleStatus::Moving;
            updated.last_seen_camera = camera_id.to_string();
            updated.last_seen_at = ts;
            updated.detection_count += 1;

            if !self.store.update_record(versioned.version, &updated).await? {
                continue;
            }
            self.store.arm_timer(&plate, self.config.window).await?;

            let path = updated.path_cameras();
            let location = self.cameras.resolve_location(camera_id).await;
            self.emit(TrackEvent::Moved(MovedEvent {
                plate: plate.clone(),
                camera_id: camera_id.to_string(),
                path: path.clone(),
                location,
                ts,
            }))
            .await;

            return Ok(DetectOutcome {
                action: DetectAction::Moved,
                plate,
                status: Some(VehicleStatus::Moving),
                last_seen_camera: Some(camera_id.to_string()),
                path: Some(path),
                message: "Path updated".to_string(),
            });
        }

        Err(Error::Conflict(format!(
            "Detection for {} not applied after {} retries",
            plate, self.config.max_cas_retries
        )))
    }

    /// Handle timer expiry for a plate. Invoked by the reaper, and inline
    /// by `on_detect` when it finds an active record without a timer.
    /// Idempotent: whichever caller wins the CAS removal archives the
    /// episode, every other caller observes `NoAction`.
    pub async fn on_timer_expire(&self, plate_raw: &str) -> Result<ExpiryOutcome> {
        let plate = Self::normalize_plate(plate_raw);

        for _ in 0..self.config.max_cas_retries {
            let versioned = match self.store.get_record(&plate).await? {
                Some(v) => v,
                // Already archived or never tracked
                None => return Ok(ExpiryOutcome::NoAction),
            };

            // A concurrent detection may have re-armed the timer since the
            // expiry signal was observed
            if self.store.timer_remaining(&plate).await?.is_some() {
                return Ok(ExpiryOutcome::NoAction);
            }

            match self.apply_expiry(&versioned).await? {
                ExpiryOutcome::Parked(status) => return Ok(ExpiryOutcome::Parked(status)),
                ExpiryOutcome::NoAction => continue,
            }
        }

        Err(Error::Conflict(format!(
            "Expiry for {} not applied after {} retries",
            plate, self.config.max_cas_retries
        )))
    }

    // ========================================
    // Transition helpers
    // ========================================

    /// Rule 2: first accepted detection of an untracked plate.
    /// Returns `None` when a concurrent creation won.
    async fn start_episode(
        &self,
        plate: &str,
        camera_id: &str,
        ts: DateTime<Utc>,
    ) -> Result<Option<DetectOutcome>> {
        let record = VehicleRecord {
            plate: plate.to_string(),
            status: VehicleStatus::Entered,
            first_seen_at: ts,
            last_seen_at: ts,
            last_seen_camera: camera_id.to_string(),
            detection_count: 1,
            path_history: vec![PathEntry {
                camera_id: camera_id.to_string(),
                ts,
            }],
        };

        if !self.store.insert_record(&record).await? {
            return Ok(None);
        }
        self.store.arm_timer(plate, self.config.window).await?;

        tracing::info!(
            plate = %plate,
            camera_id = %camera_id,
            window_sec = self.config.window.as_secs(),
            "Vehicle entered tracking"
        );

        let location = self.cameras.resolve_location(camera_id).await;
        self.emit(TrackEvent::Entry(EntryEvent {
            plate: plate.to_string(),
            camera_id: camera_id.to_string(),
            location,
            ts,
        }))
        .await;

        Ok(Some(DetectOutcome {
            action: DetectAction::Entry,
            plate: plate.to_string(),
            status: Some(VehicleStatus::Entered),
            last_seen_camera: Some(camera_id.to_string()),
            path: None,
            message: format!("Entry recorded. Timer started {}s", self.config.window.as_secs()),
        }))
    }

    /// Rule 3: exit at the entry camera. Returns `None` on a lost CAS race.
    async fn finish_exit(
        &self,
        versioned: &VersionedRecord,
        ts: DateTime<Utc>,
    ) -> Result<Option<DetectOutcome>> {
        let mut archived = versioned.record.clone();
        archived.status = VehicleStatus::Exited;
        archived.last_seen_at = ts;
        archived.detection_count += 1;
        let plate = archived.plate.clone();
        let camera_id = archived.last_seen_camera.clone();

        if !self.store.remove_record(&plate, versioned.version).await? {
            return Ok(None);
        }
        self.store.cancel_timer(&plate).await?;
        self.store
            .archive_record(&archived, self.config.archive_retention)
            .await?;

        tracing::info!(
            plate = %plate,
            camera_id = %camera_id,
            detections = archived.detection_count,
            "Vehicle exited"
        );

        let location = self.cameras.resolve_location(&camera_id).await;
        self.emit(TrackEvent::Exit(ExitEvent {
            plate: plate.clone(),
            camera_id,
            location,
            ts,
        }))
        .await;

        Ok(Some(DetectOutcome {
            action: DetectAction::Exit,
            plate,
            status: Some(VehicleStatus::Exited),
            last_seen_camera: None,
            path: None,
            message: "Vehicle exited, removed from active tracking".to_string(),
        }))
    }

    /// Rule 6: the window lapsed. Archives the record under its terminal
    /// parked status; `NoAction` means the CAS removal lost to a concurrent
    /// transition.
    async fn apply_expiry(&self, versioned: &VersionedRecord) -> Result<ExpiryOutcome> {
        let rec = &versioned.record;
        let final_status =
            if rec.status == VehicleStatus::Entered && rec.path_history.len() == 1 {
                VehicleStatus::ParkedNear(rec.last_seen_camera.clone())
            } else {
                VehicleStatus::Parked
            };

        let mut archived = rec.clone();
        archived.status = final_status.clone();
        archived.last_seen_at = Utc::now();

        if !self
            .store
            .remove_record(&rec.plate, versioned.version)
            .await?
        {
            return Ok(ExpiryOutcome::NoAction);
        }
        self.store.cancel_timer(&rec.plate).await?;
        self.store
            .archive_record(&archived, self.config.archive_retention)
            .await?;

        tracing::info!(
            plate = %rec.plate,
            camera_id = %rec.last_seen_camera,
            final_status = %final_status,
            "Tracking window lapsed, vehicle marked parked"
        );

        let location = self.cameras.resolve_location(&rec.last_seen_camera).await;
        let camera_name = self.cameras.resolve_name(&rec.last_seen_camera).await;
        self.emit(TrackEvent::LastSeen(LastSeenEvent {
            plate: rec.plate.clone(),
            camera_id: rec.last_seen_camera.clone(),
            camera_name,
            final_status: final_status.clone(),
            location,
            ts: archived.last_seen_at,
        }))
        .await;

        Ok(ExpiryOutcome::Parked(final_status))
    }

    /// Record the event and dispatch notifications. The transition has
    /// already committed; notification failure never propagates back.
    async fn emit(&self, event: TrackEvent) {
        tracing::info!(
            plate = %event.plate(),
            event_type = %event.kind(),
            "Tracking event emitted"
        );
        self.event_log.add_event(event.clone()).await;

        // Movement is path visibility only; owners hear about entry, exit
        // and last-seen
        if !matches!(event, TrackEvent::Moved(_)) {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                notifier.notify_event(&event).await;
            });
        }
    }

    // ========================================
    // Query surface
    // ========================================

    /// Current state of a plate, with remaining timer seconds computed
    /// from the store TTL
    pub async fn get_vehicle(&self, plate_raw: &str) -> Result<Option<VehicleSnapshot>> {
        let plate = Self::normalize_plate(plate_raw);
        let versioned = match self.store.get_record(&plate).await? {
            Some(v) => v,
            None => return Ok(None),
        };
        let remaining = self.store.timer_remaining(&plate).await?;
        Ok(Some(Self::snapshot(versioned.record, remaining)))
    }

    /// All actively tracked vehicles
    pub async fn list_active(&self) -> Result<Vec<VehicleSnapshot>> {
        let records = self.store.list_records().await?;
        let mut snapshots = Vec::with_capacity(records.len());
        for versioned in records {
            let remaining = self.store.timer_remaining(&versioned.record.plate).await?;
            snapshots.push(Self::snapshot(versioned.record, remaining));
        }
        snapshots.sort_by(|a, b| a.plate.cmp(&b.plate));
        Ok(snapshots)
    }

    /// Archived episodes for a plate within retention, newest first
    pub async fn history(&self, plate_raw: &str) -> Result<Vec<ArchivedVehicle>> {
        let plate = Self::normalize_plate(plate_raw);
        self.store.archived_episodes(&plate).await
    }

    fn snapshot(record: VehicleRecord, remaining: Option<Duration>) -> VehicleSnapshot {
        VehicleSnapshot {
            plate: record.plate,
            status: record.status,
            first_seen_at: record.first_seen_at,
            last_seen_at: record.last_seen_at,
            last_seen_camera: record.last_seen_camera,
            detection_count: record.detection_count,
            path_history: record.path_history,
            timer_remaining_seconds: remaining.map(|d| d.as_secs()).unwrap_or(0),
        }
    }
}
