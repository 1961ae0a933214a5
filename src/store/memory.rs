//! In-memory store for single-process deployments
//!
//! Timers and archive retention are plain `expires_at` instants checked
//! lazily on read and swept by the reaper's scan. Versions start at 1 and
//! increment on every compare-and-set update.

use super::{ArchivedVehicle, TrackerStore, VersionedRecord};
use crate::camera_registry::CameraMetadata;
use crate::error::Result;
use crate::tracker::types::VehicleRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

struct ArchiveEntry {
    snapshot: ArchivedVehicle,
    expires_at: DateTime<Utc>,
}

/// Single-process implementation of [`TrackerStore`]
pub struct MemoryStore {
    records: RwLock<HashMap<String, (VehicleRecord, u64)>>,
    timers: RwLock<HashMap<String, DateTime<Utc>>>,
    archive: RwLock<Vec<ArchiveEntry>>,
    cameras: RwLock<HashMap<String, CameraMetadata>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            timers: RwLock::new(HashMap::new()),
            archive: RwLock::new(Vec::new()),
            cameras: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis() as i64)
}

#[async_trait]
impl TrackerStore for MemoryStore {
    async fn get_record(&self, plate: &str) -> Result<Option<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records.get(plate).map(|(record, version)| VersionedRecord {
            record: record.clone(),
            version: *version,
        }))
    }

    async fn insert_record(&self, record: &VehicleRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.plate) {
            return Ok(false);
        }
        records.insert(record.plate.clone(), (record.clone(), 1));
        Ok(true)
    }

    async fn update_record(&self, expected_version: u64, record: &VehicleRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.plate) {
            Some((stored, version)) if *version == expected_version => {
                *stored = record.clone();
                *version += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove_record(&self, plate: &str, expected_version: u64) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get(plate) {
            Some((_, version)) if *version == expected_version => {
                records.remove(plate);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_records(&self) -> Result<Vec<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .map(|(record, version)| VersionedRecord {
                record: record.clone(),
                version: *version,
            })
            .collect())
    }

    async fn arm_timer(&self, plate: &str, window: Duration) -> Result<()> {
        let mut timers = self.timers.write().await;
        timers.insert(plate.to_string(), Utc::now() + to_chrono(window));
        Ok(())
    }

    async fn cancel_timer(&self, plate: &str) -> Result<()> {
        let mut timers = self.timers.write().await;
        timers.remove(plate);
        Ok(())
    }

    async fn timer_remaining(&self, plate: &str) -> Result<Option<Duration>> {
        let now = Utc::now();
        let expires_at = { self.timers.read().await.get(plate).copied() };
        match expires_at {
            Some(expires_at) if expires_at > now => {
                Ok(Some((expires_at - now).to_std().unwrap_or_default()))
            }
            Some(_) => {
                // Lapsed entry: drop it so repeated reads agree with
                // scan_expired
                let mut timers = self.timers.write().await;
                if timers.get(plate).map_or(false, |e| *e <= now) {
                    timers.remove(plate);
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn scan_expired(&self) -> Result<Vec<String>> {
        let now = Utc::now();
        let records = self.records.read().await;
        let timers = self.timers.read().await;
        Ok(records
            .keys()
            .filter(|plate| match timers.get(*plate) {
                Some(expires_at) => *expires_at <= now,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn archive_record(&self, record: &VehicleRecord, retention: Duration) -> Result<()> {
        let now = Utc::now();
        let mut archive = self.archive.write().await;
        archive.push(ArchiveEntry {
            snapshot: ArchivedVehicle {
                episode_id: Uuid::new_v4(),
                plate: record.plate.clone(),
                record: record.clone(),
                archived_at: now,
            },
            expires_at: now + to_chrono(retention),
        });
        Ok(())
    }

    async fn archived_episodes(&self, plate: &str) -> Result<Vec<ArchivedVehicle>> {
        let now = Utc::now();
        let archive = self.archive.read().await;
        let mut episodes: Vec<ArchivedVehicle> = archive
            .iter()
            .filter(|e| e.snapshot.plate == plate && e.expires_at > now)
            .map(|e| e.snapshot.clone())
            .collect();
        episodes.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        Ok(episodes)
    }

    async fn purge_archive(&self) -> Result<u64> {
        let now = Utc::now();
        let mut archive = self.archive.write().await;
        let before = archive.len();
        archive.retain(|e| e.expires_at > now);
        Ok((before - archive.len()) as u64)
    }

    async fn set_camera(&self, meta: &CameraMetadata) -> Result<()> {
        let mut cameras = self.cameras.write().await;
        cameras.insert(meta.camera_id.clone(), meta.clone());
        Ok(())
    }

    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraMetadata>> {
        let cameras = self.cameras.read().await;
        Ok(cameras.get(camera_id).cloned())
    }

    async fn list_cameras(&self) -> Result<Vec<CameraMetadata>> {
        let cameras = self.cameras.read().await;
        let mut all: Vec<CameraMetadata> = cameras.values().cloned().collect();
        all.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        Ok(all)
    }
}
