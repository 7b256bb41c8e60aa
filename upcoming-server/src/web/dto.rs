//! Data transfer objects for web requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::merge::UpcomingEntry;
use crate::realtime::FeedStatus;

/// Query string for the departure endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct StopQuery {
    /// Comma-separated stop ids, e.g. `?stop=8220DB000490,8220DB000491`.
    pub stop: Option<String>,
}

impl StopQuery {
    /// The requested stops, or `None` when the query names none.
    pub fn stops(&self) -> Option<Vec<String>> {
        let raw = self.stop.as_deref()?;
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// The stops a departure query should cover: the query's own list, the
    /// configured defaults when the parameter is absent, and `None` when the
    /// parameter is present but empty. `?stop=` asks for nothing, and gets
    /// an empty result rather than a fallback to the defaults.
    pub fn requested_stops(&self, defaults: &[String]) -> Option<Vec<String>> {
        match self.stops() {
            Some(stops) if stops.is_empty() => None,
            Some(stops) => Some(stops),
            None => Some(defaults.to_vec()),
        }
    }
}

/// Body of `/upcoming.json`.
#[derive(Debug, Serialize)]
pub struct UpcomingResponse {
    /// Epoch seconds of the serving instant, for client-side countdowns.
    pub current_timestamp: i64,
    pub upcoming: Vec<UpcomingEntry>,
}

/// Body of `/scheduled.json`.
#[derive(Debug, Serialize)]
pub struct ScheduledResponse {
    pub current_timestamp: i64,
    pub scheduled: Vec<UpcomingEntry>,
}

/// Body of `/live.json`.
#[derive(Debug, Serialize)]
pub struct LiveResponse {
    pub current_timestamp: i64,
    pub live: Vec<UpcomingEntry>,
}

/// Body of `/debugz`.
#[derive(Debug, Serialize)]
pub struct DebugResponse {
    pub schedule: ScheduleDebug,
    pub snapshot: SnapshotDebug,
    pub feed: FeedStatus,
}

#[derive(Debug, Serialize)]
pub struct ScheduleDebug {
    pub routes: usize,
    pub stops: usize,
    pub trips: usize,
    pub stop_times: usize,
}

#[derive(Debug, Serialize)]
pub struct SnapshotDebug {
    pub trips: usize,
    pub updates: usize,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub decoded_at: Option<DateTime<Utc>>,
}

/// Body of a successful `POST /reloadz`.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub trips: usize,
    pub stops: usize,
}
