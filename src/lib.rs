//! ANPR Trackserver Library
//!
//! Vehicle tracking engine over camera detection events.
//!
//! ## Architecture
//!
//! 1. TrackerStore - shared record/timer/archive/camera state (memory or MySQL)
//! 2. VehicleTracker - state machine, dedup, timers, event emission
//! 3. TimerReaper - expiry polling fallback and archive retention
//! 4. CameraRegistry - per-camera coordinates and display names
//! 5. EventLogService - emitted-event ring buffer
//! 6. Notifier - Telegram/webhook delivery, fire-and-forget
//! 7. WebAPI - REST ingestion and query surface
//!
//! ## Design Principles
//!
//! - Every transition commits through compare-and-set against the store;
//!   stale reads are recomputed, never written
//! - Expiry is one idempotent handler, however many producers observe it
//! - Notification failure never touches tracking state

pub mod camera_registry;
pub mod error;
pub mod event_log;
pub mod models;
pub mod notifier;
pub mod state;
pub mod store;
pub mod timer_reaper;
pub mod tracker;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
