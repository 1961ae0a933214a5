//! EventLogService - domain event recording (ring buffer)
//!
//! ## Responsibilities
//!
//! - Keep recently emitted tracking events in a bounded ring buffer
//! - Provide event queries for the API layer
//!
//! Emission into the log happens after the state transition has committed;
//! the log is a visibility aid, not the source of truth.

use crate::tracker::types::TrackEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// A logged event with its assigned sequence id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub event_id: u64,
    pub event: TrackEvent,
    pub created_at: DateTime<Utc>,
}

/// Ring buffer for events
struct EventRingBuffer {
    events: VecDeque<LoggedEvent>,
    capacity: usize,
    next_id: u64,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, event: TrackEvent) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(LoggedEvent {
            event_id: id,
            event,
            created_at: Utc::now(),
        });
        id
    }

    fn get_latest(&self, count: usize) -> Vec<LoggedEvent> {
        self.events.iter().rev().take(count).cloned().collect()
    }

    fn get_by_plate(&self, plate: &str, count: usize) -> Vec<LoggedEvent> {
        self.events
            .iter()
            .rev()
            .filter(|e| e.event.plate() == plate)
            .take(count)
            .cloned()
            .collect()
    }
}

/// EventLogService instance
pub struct EventLogService {
    buffer: RwLock<EventRingBuffer>,
}

impl EventLogService {
    /// Create new EventLogService
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
        }
    }

    /// Add event
    pub async fn add_event(&self, event: TrackEvent) -> u64 {
        let mut buffer = self.buffer.write().await;
        let id = buffer.push(event);
        tracing::debug!(event_id = id, "Event added to ring buffer");
        id
    }

    /// Get latest events
    pub async fn get_latest(&self, count: usize) -> Vec<LoggedEvent> {
        let buffer = self.buffer.read().await;
        buffer.get_latest(count)
    }

    /// Get events for a plate
    pub async fn get_by_plate(&self, plate: &str, count: usize) -> Vec<LoggedEvent> {
        let buffer = self.buffer.read().await;
        buffer.get_by_plate(plate, count)
    }

    /// Get event count
    pub async fn count(&self) -> usize {
        let buffer = self.buffer.read().await;
        buffer.events.len()
    }
}

impl Default for EventLogService {
    fn default() -> Self {
        Self::new(2000)
    }
}
