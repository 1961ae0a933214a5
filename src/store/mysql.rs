//! MySQL-backed shared store
//!
//! Used when multiple backend instances share tracking state. The Redis-ish
//! semantics map onto SQL as follows: per-key TTL becomes an `expires_at`
//! column checked against `NOW(3)`, and optimistic locking becomes a
//! `version` column guarding `UPDATE`/`DELETE` statements - zero rows
//! affected means the caller lost the race and must re-read.

use super::{ArchivedVehicle, TrackerStore, VersionedRecord};
use crate::camera_registry::CameraMetadata;
use crate::error::{Error, Result};
use crate::tracker::types::VehicleRecord;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::MySqlPool;
use std::time::Duration;
use uuid::Uuid;

/// Shared [`TrackerStore`] implementation over MySQL
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the backing tables if they do not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_records (
                plate VARCHAR(32) NOT NULL PRIMARY KEY,
                record TEXT NOT NULL,
                version BIGINT UNSIGNED NOT NULL,
                updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3)
                    ON UPDATE CURRENT_TIMESTAMP(3)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_timers (
                plate VARCHAR(32) NOT NULL PRIMARY KEY,
                expires_at DATETIME(3) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_archive (
                id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                episode_id CHAR(36) NOT NULL,
                plate VARCHAR(32) NOT NULL,
                record TEXT NOT NULL,
                archived_at DATETIME(3) NOT NULL,
                expires_at DATETIME(3) NOT NULL,
                INDEX idx_archive_plate (plate),
                INDEX idx_archive_expires (expires_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cameras (
                camera_id VARCHAR(64) NOT NULL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                latitude DOUBLE NOT NULL,
                longitude DOUBLE NOT NULL,
                updated_at DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3)
                    ON UPDATE CURRENT_TIMESTAMP(3)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Store schema initialized");
        Ok(())
    }
}

fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::milliseconds(d.as_millis() as i64)
}

#[async_trait]
impl TrackerStore for MySqlStore {
    async fn get_record(&self, plate: &str) -> Result<Option<VersionedRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT record, version FROM vehicle_records WHERE plate = ?",
        )
        .bind(plate)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        row.map(VersionedRecord::try_from).transpose()
    }

    async fn insert_record(&self, record: &VehicleRecord) -> Result<bool> {
        let payload = serde_json::to_string(record)?;
        let result = sqlx::query(
            "INSERT IGNORE INTO vehicle_records (plate, record, version) VALUES (?, ?, 1)",
        )
        .bind(&record.plate)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_record(&self, expected_version: u64, record: &VehicleRecord) -> Result<bool> {
        let payload = serde_json::to_string(record)?;
        let result = sqlx::query(
            r#"
            UPDATE vehicle_records
            SET record = ?, version = version + 1
            WHERE plate = ? AND version = ?
            "#,
        )
        .bind(payload)
        .bind(&record.plate)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove_record(&self, plate: &str, expected_version: u64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vehicle_records WHERE plate = ? AND version = ?")
            .bind(plate)
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_records(&self) -> Result<Vec<VersionedRecord>> {
        let rows = sqlx::query_as::<_, RecordRow>("SELECT record, version FROM vehicle_records")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        rows.into_iter().map(VersionedRecord::try_from).collect()
    }

    async fn arm_timer(&self, plate: &str, window: Duration) -> Result<()> {
        let expires_at = Utc::now() + to_chrono(window);
        sqlx::query(
            r#"
            INSERT INTO vehicle_timers (plate, expires_at)
            VALUES (?, ?)
            ON DUPLICATE KEY UPDATE expires_at = VALUES(expires_at)
            "#,
        )
        .bind(plate)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(())
    }

    async fn cancel_timer(&self, plate: &str) -> Result<()> {
        sqlx::query("DELETE FROM vehicle_timers WHERE plate = ?")
            .bind(plate)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        Ok(())
    }

    async fn timer_remaining(&self, plate: &str) -> Result<Option<Duration>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT expires_at FROM vehicle_timers WHERE plate = ?")
                .bind(plate)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| Error::Store(e.to_string()))?;

        let now = Utc::now();
        match row {
            Some((expires_at,)) if expires_at > now => {
                Ok(Some((expires_at - now).to_std().unwrap_or_default()))
            }
            Some(_) => {
                // Lapsed row: drop it so repeated reads agree with scan_expired
                sqlx::query("DELETE FROM vehicle_timers WHERE plate = ? AND expires_at <= NOW(3)")
                    .bind(plate)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::Store(e.to_string()))?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn scan_expired(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.plate
            FROM vehicle_records r
            LEFT JOIN vehicle_timers t ON r.plate = t.plate
            WHERE t.plate IS NULL OR t.expires_at <= NOW(3)
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(rows.into_iter().map(|(plate,)| plate).collect())
    }

    async fn archive_record(&self, record: &VehicleRecord, retention: Duration) -> Result<()> {
        let now = Utc::now();
        let payload = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO vehicle_archive (episode_id, plate, record, archived_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&record.plate)
        .bind(payload)
        .bind(now)
        .bind(now + to_chrono(retention))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(())
    }

    async fn archived_episodes(&self, plate: &str) -> Result<Vec<ArchivedVehicle>> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            r#"
            SELECT episode_id, plate, record, archived_at
            FROM vehicle_archive
            WHERE plate = ? AND expires_at > NOW(3)
            ORDER BY archived_at DESC
            "#,
        )
        .bind(plate)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        rows.into_iter().map(ArchivedVehicle::try_from).collect()
    }

    async fn purge_archive(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM vehicle_archive WHERE expires_at <= NOW(3)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(e.to_string()))?;

        // Lapsed timer rows whose record is already gone are dead weight
        sqlx::query(
            r#"
            DELETE t FROM vehicle_timers t
            LEFT JOIN vehicle_records r ON t.plate = r.plate
            WHERE r.plate IS NULL AND t.expires_at <= NOW(3)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn set_camera(&self, meta: &CameraMetadata) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cameras (camera_id, name, latitude, longitude)
            VALUES (?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE
                name = VALUES(name),
                latitude = VALUES(latitude),
                longitude = VALUES(longitude),
                updated_at = NOW(3)
            "#,
        )
        .bind(&meta.camera_id)
        .bind(&meta.name)
        .bind(meta.latitude)
        .bind(meta.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(())
    }

    async fn get_camera(&self, camera_id: &str) -> Result<Option<CameraMetadata>> {
        let row = sqlx::query_as::<_, CameraRow>(
            "SELECT camera_id, name, latitude, longitude FROM cameras WHERE camera_id = ?",
        )
        .bind(camera_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(row.map(CameraMetadata::from))
    }

    async fn list_cameras(&self) -> Result<Vec<CameraMetadata>> {
        let rows = sqlx::query_as::<_, CameraRow>(
            "SELECT camera_id, name, latitude, longitude FROM cameras ORDER BY camera_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Store(e.to_string()))?;

        Ok(rows.into_iter().map(CameraMetadata::from).collect())
    }
}

// ========================================
// Row Types (sqlx)
// ========================================

#[derive(sqlx::FromRow)]
struct RecordRow {
    record: String,
    version: u64,
}

impl TryFrom<RecordRow> for VersionedRecord {
    type Error = Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        let record: VehicleRecord = serde_json::from_str(&row.record)?;
        Ok(Self {
            record,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ArchiveRow {
    episode_id: String,
    plate: String,
    record: String,
    archived_at: DateTime<Utc>,
}

impl TryFrom<ArchiveRow> for ArchivedVehicle {
    type Error = Error;

    fn try_from(row: ArchiveRow) -> Result<Self> {
        let record: VehicleRecord = serde_json::from_str(&row.record)?;
        let episode_id = Uuid::parse_str(&row.episode_id)
            .map_err(|e| Error::Internal(format!("Bad episode id {}: {}", row.episode_id, e)))?;
        Ok(Self {
            episode_id,
            plate: row.plate,
            record,
            archived_at: row.archived_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CameraRow {
    camera_id: String,
    name: String,
    latitude: f64,
    longitude: f64,
}

impl From<CameraRow> for CameraMetadata {
    fn from(row: CameraRow) -> Self {
        Self {
            camera_id: row.camera_id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
        }
    }
}
