//! HTTP route handlers.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use tracing::{error, info};

use crate::merge::{SourceFilter, UpcomingEntry, upcoming};
use crate::schedule::load_schedule;

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/upcoming.json", get(upcoming_json))
        .route("/scheduled.json", get(scheduled_json))
        .route("/live.json", get(live_json))
        .route("/health", get(health))
        .route("/debugz", get(debugz))
        .route("/reloadz", post(reloadz))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Run one merge query against the current index and snapshot.
async fn merged(state: &AppState, query: &StopQuery, filter: SourceFilter) -> Vec<UpcomingEntry> {
    let Some(stops) = query.requested_stops(&state.default_stops) else {
        return Vec::new();
    };
    let index = state.schedule.load().await;
    let live = state.live.load().await;
    upcoming(&index, &live, &state.merge, &stops, Utc::now(), filter)
}

/// Live-over-scheduled departures for the requested stops.
async fn upcoming_json(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> Json<UpcomingResponse> {
    Json(UpcomingResponse {
        current_timestamp: Utc::now().timestamp(),
        upcoming: merged(&state, &query, SourceFilter::Both).await,
    })
}

/// Timetable-only departures; the live feed is ignored.
async fn scheduled_json(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> Json<ScheduledResponse> {
    Json(ScheduledResponse {
        current_timestamp: Utc::now().timestamp(),
        scheduled: merged(&state, &query, SourceFilter::Schedule).await,
    })
}

/// Departures whose due time the feed produced.
async fn live_json(
    State(state): State<AppState>,
    Query(query): Query<StopQuery>,
) -> Json<LiveResponse> {
    Json(LiveResponse {
        current_timestamp: Utc::now().timestamp(),
        live: merged(&state, &query, SourceFilter::Live).await,
    })
}

/// Introspection: index sizes, snapshot age, poll status.
async fn debugz(State(state): State<AppState>) -> Json<DebugResponse> {
    let index = state.schedule.load().await;
    let snapshot = state.live.load().await;
    let feed = state.feed_status.read().await.clone();

    Json(DebugResponse {
        schedule: ScheduleDebug {
            routes: index.route_count(),
            stops: index.stop_count(),
            trips: index.trip_count(),
            stop_times: index.stop_time_count(),
        },
        snapshot: SnapshotDebug {
            trips: snapshot.trip_count(),
            updates: snapshot.update_count(),
            feed_timestamp: snapshot.feed_timestamp,
            decoded_at: snapshot.decoded_at,
        },
        feed,
    })
}

/// Rebuild the index from disk and swap it in. The load runs off the
/// request path; on failure the old index keeps serving.
async fn reloadz(
    State(state): State<AppState>,
) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    let dir = state.gtfs_dir.clone();
    let loader = state.loader.clone();
    let allowlist = state.allowlist.clone();

    let result = tokio::task::spawn_blocking(move || {
        load_schedule(&dir, &loader, (*allowlist).as_ref())
    })
    .await;

    let index = match result {
        Ok(Ok(index)) => index,
        Ok(Err(e)) => {
            error!(error = %e, "schedule reload failed, keeping previous index");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
        Err(e) => {
            error!(error = %e, "schedule reload task panicked");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "reload task failed".to_string(),
            ));
        }
    };

    let response = ReloadResponse {
        trips: index.trip_count(),
        stops: index.stop_count(),
    };
    state.schedule.replace(index).await;
    info!(trips = response.trips, stops = response.stops, "schedule reloaded");
    Ok(Json(response))
}
