//! Application state for the web layer.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::merge::MergeConfig;
use crate::realtime::{SharedFeedStatus, SharedLive};
use crate::schedule::{LoaderConfig, SharedSchedule};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub schedule: SharedSchedule,
    pub live: SharedLive,
    pub feed_status: SharedFeedStatus,
    pub merge: Arc<MergeConfig>,

    /// Stops served when a query names none. Empty means every stop.
    pub default_stops: Arc<Vec<String>>,

    /// Reload inputs: where the schedule lives and how to load it.
    pub gtfs_dir: Arc<PathBuf>,
    pub loader: Arc<LoaderConfig>,
    pub allowlist: Arc<Option<HashSet<String>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        schedule: SharedSchedule,
        live: SharedLive,
        feed_status: SharedFeedStatus,
        merge: MergeConfig,
        default_stops: Vec<String>,
        gtfs_dir: PathBuf,
        loader: LoaderConfig,
        allowlist: Option<HashSet<String>>,
    ) -> Self {
        Self {
            schedule,
            live,
            feed_status,
            merge: Arc::new(merge),
            default_stops: Arc::new(default_stops),
            gtfs_dir: Arc::new(gtfs_dir),
            loader: Arc::new(loader),
            allowlist: Arc::new(allowlist),
        }
    }
}
