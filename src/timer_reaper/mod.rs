//! TimerReaper - expiry polling loop
//!
//! ## Responsibilities
//!
//! - Guarantee the expiry transition fires even when the store delivers no
//!   push notification for lapsed timers
//! - Purge archive entries past retention
//!
//! The poll interval must be strictly shorter than the tracking window.
//! Each scan looks for the mismatch "record still active, timer gone" and
//! funnels every hit into `VehicleTracker::on_timer_expire`, the same
//! CAS-guarded handler a push notification would invoke. Running several
//! reaper instances concurrently is safe: whichever applies the CAS
//! removal first wins, the rest observe a no-op.

use crate::store::TrackerStore;
use crate::tracker::VehicleTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;

/// TimerReaper instance
pub struct TimerReaper {
    tracker: Arc<VehicleTracker>,
    store: Arc<dyn TrackerStore>,
    poll_interval: Duration,
    running: Arc<RwLock<bool>>,
}

impl TimerReaper {
    /// Create new TimerReaper
    pub fn new(
        tracker: Arc<VehicleTracker>,
        store: Arc<dyn TrackerStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            store,
            poll_interval,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the reaper loop
    pub async fn start(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Timer reaper already running");
                return;
            }
            *running = true;
        }

        tracing::info!(
            poll_interval_sec = self.poll_interval.as_secs_f64(),
            "Starting timer reaper"
        );

        let tracker = self.tracker.clone();
        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        let running = self.running.clone();

        tokio::spawn(async move {
            let mut tick = interval(poll_interval);

            loop {
                tick.tick().await;

                {
                    let is_running = running.read().await;
                    if !*is_running {
                        break;
                    }
                }

                Self::run_once(&tracker, &store).await;
            }

            tracing::info!("Timer reaper stopped");
        });
    }

    /// Stop the reaper loop
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping timer reaper");
    }

    /// One scan pass: expire lapsed vehicles, then drop stale archive rows
    pub async fn run_once(tracker: &VehicleTracker, store: &Arc<dyn TrackerStore>) {
        let expired = match store.scan_expired().await {
            Ok(plates) => plates,
            Err(e) => {
                tracing::error!(error = %e, "Expiry scan failed");
                return;
            }
        };

        for plate in expired {
            match tracker.on_timer_expire(&plate).await {
                Ok(outcome) => {
                    tracing::debug!(plate = %plate, outcome = ?outcome, "Processed timer expiry");
                }
                Err(e) => {
                    tracing::error!(plate = %plate, error = %e, "Timer expiry handling failed");
                }
            }
        }

        match store.purge_archive().await {
            Ok(0) => {}
            Ok(purged) => {
                tracing::debug!(purged = purged, "Purged expired archive entries");
            }
            Err(e) => {
                tracing::error!(error = %e, "Archive purge failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_registry::CameraRegistry;
    use crate::event_log::EventLogService;
    use crate::notifier::{Notifier, NotifierConfig};
    use crate::store::MemoryStore;
    use crate::tracker::types::VehicleStatus;
    use crate::tracker::TrackerConfig;
    use chrono::Utc;

    fn build(window: Duration) -> (Arc<VehicleTracker>, Arc<dyn TrackerStore>) {
        let store: Arc<dyn TrackerStore> = Arc::new(MemoryStore::new());
        let cameras = Arc::new(CameraRegistry::new(store.clone()));
        let event_log = Arc::new(EventLogService::new(100));
        let notifier = Arc::new(Notifier::new(NotifierConfig::default()));
        let tracker = Arc::new(VehicleTracker::new(
            store.clone(),
            cameras,
            event_log,
            notifier,
            TrackerConfig {
                window,
                ..TrackerConfig::default()
            },
        ));
        (tracker, store)
    }

    #[tokio::test]
    async fn test_scan_expires_lapsed_vehicle() {
        let (tracker, store) = build(Duration::from_millis(80));
        tracker
            .on_detect("MH20EE7598", "camera1", Utc::now())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        TimerReaper::run_once(&tracker, &store).await;

        assert!(tracker.get_vehicle("MH20EE7598").await.unwrap().is_none());
        let history = tracker.history("MH20EE7598").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0].record.status,
            VehicleStatus::ParkedNear("camera1".to_string())
        );
    }

    #[tokio::test]
    async fn test_scan_leaves_live_vehicles_alone() {
        let (tracker, store) = build(Duration::from_secs(30));
        tracker
            .on_detect("MH20EE7598", "camera1", Utc::now())
            .await
            .unwrap();

        TimerReaper::run_once(&tracker, &store).await;

        assert!(tracker.get_vehicle("MH20EE7598").await.unwrap().is_some());
        assert!(tracker.history("MH20EE7598").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_scans_archive_once() {
        let (tracker, store) = build(Duration::from_millis(80));
        tracker
            .on_detect("MH20EE7598", "camera1", Utc::now())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        // Two reaper instances racing over the same lapsed vehicle
        tokio::join!(
            TimerReaper::run_once(&tracker, &store),
            TimerReaper::run_once(&tracker, &store)
        );

        let history = tracker.history("MH20EE7598").await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (tracker, store) = build(Duration::from_millis(50));
        let reaper = TimerReaper::new(tracker.clone(), store, Duration::from_millis(20));
        reaper.start().await;

        tracker
            .on_detect("MH20EE7598", "camera1", Utc::now())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The loop picked up the lapsed timer on its own
        assert!(tracker.get_vehicle("MH20EE7598").await.unwrap().is_none());
        reaper.stop().await;
    }
}
