//! Command-line configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono_tz::Tz;
use clap::Parser;

use crate::realtime::Provider;
use crate::schedule::{LoaderConfig, WorkerModel};

/// Upcoming transit departures from a GTFS schedule and realtime feed.
#[derive(Debug, Parser)]
#[command(name = "upcoming-server", version)]
pub struct Args {
    /// Directory holding the GTFS schedule tables.
    #[arg(long, value_name = "DIR")]
    pub gtfs_dir: PathBuf,

    /// Port to serve HTTP on.
    #[arg(long, default_value_t = 6824)]
    pub port: u16,

    /// Worker threads for the threaded loader model.
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Rows per loader chunk.
    #[arg(long, default_value_t = 100_000)]
    pub chunk_rows: usize,

    /// Loader worker model: serial or threaded.
    #[arg(long, default_value = "threaded")]
    pub worker_model: WorkerModel,

    /// Fail the load on any malformed row instead of skipping it.
    #[arg(long)]
    pub strict: bool,

    /// Stops to serve when a query names none. Empty means every stop.
    #[arg(long, value_delimiter = ',', value_name = "STOP_ID")]
    pub stops: Vec<String>,

    /// Restrict loading to `--stops`: stop times elsewhere are discarded and
    /// unreachable trips and stops dropped. Cuts memory for small deployments.
    #[arg(long, requires = "stops")]
    pub restrict_to_stops: bool,

    /// How far ahead departures are reported, in minutes.
    #[arg(long, default_value_t = 120)]
    pub horizon_minutes: i64,

    /// Live feed poll interval, in seconds.
    #[arg(long, default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Trip-update feed provider: nta, nta-test, vicroads-metrobus,
    /// vicroads-metrotrain or vicroads-tram.
    #[arg(long, default_value = "nta")]
    pub provider: Provider,

    /// IANA timezone for resolving schedule offsets. Defaults to the feed
    /// agency's timezone.
    #[arg(long, value_name = "TZ")]
    pub timezone: Option<Tz>,

    /// Default log directive when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            workers: self.workers,
            chunk_rows: self.chunk_rows,
            worker_model: self.worker_model,
            strict: self.strict,
        }
    }

    /// The loader allowlist, when `--restrict-to-stops` is on.
    pub fn allowlist(&self) -> Option<HashSet<String>> {
        if self.restrict_to_stops && !self.stops.is_empty() {
            Some(self.stops.iter().cloned().collect())
        } else {
            None
        }
    }
}
