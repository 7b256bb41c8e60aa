//! The published view of the live feed.
//!
//! A snapshot is immutable once built; the poller publishes a complete new
//! one for every successful fetch and readers swap wholesale, so stale
//! entries vanish together with the feed that carried them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// Per-stop disposition reported by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Running; the prediction applies.
    Scheduled,
    /// The trip will not call at this stop.
    Skipped,
    /// The whole trip is canceled.
    Canceled,
    /// The feed has no usable prediction here; fall back to the timetable.
    NoData,
}

/// One stop-time update from the feed, resolved to concrete UTC instants.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveUpdate {
    pub trip_id: String,
    /// Either or both of the stop keys may be present in the feed.
    pub stop_id: Option<String>,
    pub stop_sequence: Option<u32>,
    pub status: UpdateStatus,
    /// Predicted departure instant, when the feed gives an absolute time.
    pub predicted: Option<DateTime<Utc>>,
    /// Delay against the timetable in seconds; negative means early.
    pub delay_seconds: Option<i32>,
}

/// Everything the feed said about one trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripLive {
    /// Trip-level cancellation; such descriptors usually carry no per-stop
    /// updates at all.
    pub canceled: bool,
    /// Trip-level delay, applying to stops without their own update.
    pub delay_seconds: Option<i32>,
    /// Stop-time updates in feed order.
    pub updates: Vec<LiveUpdate>,
}

/// An immutable decode of one feed fetch.
#[derive(Debug, Default, PartialEq)]
pub struct LiveSnapshot {
    /// The feed header's own timestamp, when it carries one.
    pub feed_timestamp: Option<DateTime<Utc>>,
    /// When this snapshot was decoded.
    pub decoded_at: Option<DateTime<Utc>>,
    trips: HashMap<String, TripLive>,
}

impl LiveSnapshot {
    /// The pre-first-poll snapshot: no live data, everything scheduled.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(
        feed_timestamp: Option<DateTime<Utc>>,
        decoded_at: Option<DateTime<Utc>>,
        trips: HashMap<String, TripLive>,
    ) -> Self {
        Self {
            feed_timestamp,
            decoded_at,
            trips,
        }
    }

    pub fn trip(&self, trip_id: &str) -> Option<&TripLive> {
        self.trips.get(trip_id)
    }

    pub fn is_trip_canceled(&self, trip_id: &str) -> bool {
        self.trips.get(trip_id).is_some_and(|t| t.canceled)
    }

    /// The update covering one (trip, stop) pair, keyed by stop id when the
    /// feed provides it, by stop sequence otherwise.
    pub fn update_for(
        &self,
        trip_id: &str,
        stop_id: &str,
        stop_sequence: u32,
    ) -> Option<&LiveUpdate> {
        let trip = self.trips.get(trip_id)?;
        trip.updates.iter().find(|u| match &u.stop_id {
            Some(id) => id == stop_id,
            None => u.stop_sequence == Some(stop_sequence),
        })
    }

    /// Trip-level delay for stops with no update of their own.
    pub fn trip_delay(&self, trip_id: &str) -> Option<i32> {
        self.trips.get(trip_id).and_then(|t| t.delay_seconds)
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub fn update_count(&self) -> usize {
        self.trips.values().map(|t| t.updates.len()).sum()
    }
}

/// Handle for atomically publishing a new snapshot to concurrent readers.
///
/// Same shape as the schedule handle: readers take one `Arc` per query and
/// never observe a mix of two feeds.
#[derive(Clone)]
pub struct SharedLive {
    inner: Arc<RwLock<Arc<LiveSnapshot>>>,
}

impl SharedLive {
    pub fn new(snapshot: LiveSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub async fn load(&self) -> Arc<LiveSnapshot> {
        self.inner.read().await.clone()
    }

    pub async fn replace(&self, snapshot: LiveSnapshot) {
        *self.inner.write().await = Arc::new(snapshot);
    }
}
