use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use clap::Parser;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use upcoming_server::config::Args;
use upcoming_server::merge::MergeConfig;
use upcoming_server::realtime::{
    FeedSource, FeedStatus, LiveSnapshot, SharedLive, run_poller,
};
use upcoming_server::schedule::{SharedSchedule, load_schedule};
use upcoming_server::web::{AppState, create_router};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    // Load the schedule before binding anything; a service with no index
    // has nothing to serve.
    let loader = args.loader_config();
    let allowlist = args.allowlist();
    info!(dir = %args.gtfs_dir.display(), "loading GTFS schedule");
    let index = match load_schedule(&args.gtfs_dir, &loader, allowlist.as_ref()) {
        Ok(index) => index,
        Err(e) => {
            error!(error = %e, "schedule load failed");
            std::process::exit(1);
        }
    };

    let timezone = resolve_timezone(args.timezone, index.default_timezone());
    info!(%timezone, "resolving schedule offsets in feed timezone");
    let merge =
        MergeConfig::new(timezone).with_horizon(ChronoDuration::minutes(args.horizon_minutes));

    let schedule = SharedSchedule::new(index);
    let live = SharedLive::new(LiveSnapshot::empty());
    let feed_status = Arc::new(RwLock::new(FeedStatus::default()));

    // The poller is optional: without credentials the service still serves
    // the timetable.
    match std::env::var("GTFS_API_KEY") {
        Ok(api_key) => match FeedSource::new(args.provider, &api_key) {
            Ok(source) => {
                let live = live.clone();
                let feed_status = feed_status.clone();
                let interval = Duration::from_secs(args.poll_interval_secs);
                tokio::spawn(async move {
                    run_poller(source, live, feed_status, interval).await;
                });
            }
            Err(e) => {
                error!(error = %e, "cannot create feed source");
                std::process::exit(1);
            }
        },
        Err(_) => {
            warn!("GTFS_API_KEY not set; serving schedule data only");
        }
    }

    let state = AppState::new(
        schedule,
        live,
        feed_status,
        merge,
        args.stops.clone(),
        args.gtfs_dir.clone(),
        loader,
        allowlist,
    );
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app).await.expect("server error");
}

/// Timezone precedence: the flag, then the feed agency's, then UTC.
fn resolve_timezone(flag: Option<Tz>, agency: Option<&str>) -> Tz {
    if let Some(tz) = flag {
        return tz;
    }
    if let Some(name) = agency {
        match name.parse() {
            Ok(tz) => return tz,
            Err(_) => warn!(timezone = name, "agency timezone not recognised"),
        }
    }
    warn!("no usable timezone configured, falling back to UTC");
    chrono_tz::UTC
}
