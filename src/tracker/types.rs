//! Tracking engine data types
//!
//! Vehicle records, the tracking status set, and the domain events emitted
//! on state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tracking status of a vehicle within one episode.
///
/// `Parked`, `ParkedNear` and `Exited` are terminal; a terminal record is
/// archived and removed from active tracking, after which the plate may
/// start a fresh episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum VehicleStatus {
    /// First detection recorded, no camera change yet
    Entered,
    /// Seen at more than one camera
    Moving,
    /// Timer lapsed after movement
    Parked,
    /// Timer lapsed while only ever seen at the entry detection's camera
    ParkedNear(String),
    /// Re-detected at the entry camera with a single-entry path
    Exited,
}

impl VehicleStatus {
    /// Label form used on the wire and in the store (`PARKED_NEAR_<camera>`)
    pub fn label(&self) -> String {
        match self {
            Self::Entered => "ENTERED".to_string(),
            Self::Moving => "MOVING".to_string(),
            Self::Parked => "PARKED".to_string(),
            Self::ParkedNear(camera) => format!("PARKED_NEAR_{}", camera),
            Self::Exited => "EXITED".to_string(),
        }
    }

    /// Terminal statuses end the tracking episode
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Parked | Self::ParkedNear(_) | Self::Exited)
    }
}

impl From<VehicleStatus> for String {
    fn from(status: VehicleStatus) -> Self {
        status.label()
    }
}

impl TryFrom<String> for VehicleStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.as_str() {
            "ENTERED" => Ok(Self::Entered),
            "MOVING" => Ok(Self::Moving),
            "PARKED" => Ok(Self::Parked),
            "EXITED" => Ok(Self::Exited),
            other => match other.strip_prefix("PARKED_NEAR_") {
                Some(camera) if !camera.is_empty() => Ok(Self::ParkedNear(camera.to_string())),
                _ => Err(format!("Unknown vehicle status: {}", other)),
            },
        }
    }
}

impl std::fmt::Display for VehicleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One camera sighting in a vehicle's path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEntry {
    pub camera_id: String,
    pub ts: DateTime<Utc>,
}

/// Active tracking record for one plate.
///
/// `path_history` is append-only while tracked, in detection order, and
/// never contains two consecutive entries for the same camera; its first
/// entry is the camera of the entry detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub plate: String,
    pub status: VehicleStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_seen_camera: String,
    /// Accepted (non-duplicate) detections
    pub detection_count: u32,
    pub path_history: Vec<PathEntry>,
}

impl VehicleRecord {
    /// Camera ids along the path, in order
    pub fn path_cameras(&self) -> Vec<String> {
        self.path_history
            .iter()
            .map(|p| p.camera_id.clone())
            .collect()
    }
}

/// Resolved camera coordinates attached to location-bearing events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Domain events emitted on state transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum TrackEvent {
    Entry(EntryEvent),
    Moved(MovedEvent),
    Exit(ExitEvent),
    LastSeen(LastSeenEvent),
}

impl TrackEvent {
    pub fn plate(&self) -> &str {
        match self {
            Self::Entry(e) => &e.plate,
            Self::Moved(e) => &e.plate,
            Self::Exit(e) => &e.plate,
            Self::LastSeen(e) => &e.plate,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Entry(_) => "entry",
            Self::Moved(_) => "moved",
            Self::Exit(_) => "exit",
            Self::LastSeen(_) => "last_seen",
        }
    }
}

/// Vehicle entered tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryEvent {
    pub plate: String,
    pub camera_id: String,
    pub location: Option<GeoLocation>,
    pub ts: DateTime<Utc>,
}

/// Vehicle seen at a different camera (path visibility, not pushed to owners)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovedEvent {
    pub plate: String,
    pub camera_id: String,
    pub path: Vec<String>,
    pub location: Option<GeoLocation>,
    pub ts: DateTime<Utc>,
}

/// Vehicle left the way it came in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitEvent {
    pub plate: String,
    pub camera_id: String,
    pub location: Option<GeoLocation>,
    pub ts: DateTime<Utc>,
}

/// Tracking window lapsed; vehicle considered parked at its last camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSeenEvent {
    pub plate: String,
    pub camera_id: String,
    /// Display name of the last camera, when metadata is known
    pub camera_name: Option<String>,
    pub final_status: VehicleStatus,
    pub location: Option<GeoLocation>,
    pub ts: DateTime<Utc>,
}

/// Outcome of one detection event, reported to the ingestion caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectAction {
    Entry,
    Duplicate,
    UpdateSameCamera,
    Moved,
    Exit,
}

/// Detection result: action taken plus the resulting state, if any
#[derive(Debug, Clone, Serialize)]
pub struct DetectOutcome {
    pub action: DetectAction,
    pub plate: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<VehicleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_camera: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    pub message: String,
}

/// Outcome of an expiry-transition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExpiryOutcome {
    /// Record archived with the given terminal status
    Parked(VehicleStatus),
    /// Nothing to do: record gone or refreshed by a concurrent detection
    NoAction,
}

/// Query-surface view of a tracked vehicle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    pub plate: String,
    pub status: VehicleStatus,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_seen_camera: String,
    pub detection_count: u32,
    pub path_history: Vec<PathEntry>,
    /// Computed from the store TTL at query time, not stored
    pub timer_remaining_seconds: u64,
}
