//! The merge engine: static schedule plus live snapshot, reconciled into a
//! single time-ordered list of upcoming departures.
//!
//! Pure with respect to its inputs: the caller passes the index, the
//! snapshot and the clock, so every scenario is directly testable.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::domain::RouteType;
use crate::realtime::{LiveSnapshot, UpdateStatus};
use crate::schedule::ScheduleIndex;

/// Where an entry's due time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Source {
    Schedule,
    Live,
}

/// Which sources a query wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFilter {
    /// Timetable only; the snapshot is not consulted at all.
    Schedule,
    /// Only entries whose due time the feed produced.
    Live,
    /// Live data where present, timetable elsewhere.
    Both,
}

/// Merge tunables.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// How far ahead of `now` departures are reported.
    pub horizon: Duration,
    /// Timezone service-day offsets are resolved in, and due times are
    /// formatted in.
    pub timezone: Tz,
}

impl MergeConfig {
    pub fn new(timezone: Tz) -> Self {
        Self {
            horizon: Duration::minutes(120),
            timezone,
        }
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = horizon;
        self
    }
}

/// One departure a rider is waiting for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingEntry {
    pub trip_id: String,
    /// The route label riders know, e.g. `46A`.
    pub route: String,
    pub route_type: RouteType,
    pub headsign: String,
    pub direction: u8,
    pub stop_id: String,
    /// Local wall-clock due time, `HH:MM:SS`.
    pub due_time: String,
    pub due_in_seconds: i64,
    pub source: Source,
}

/// Upcoming departures for the requested stops within the horizon.
///
/// An empty `stops` slice means every stop in the index. Per (trip, stop):
/// canceled trips and skipped stops are excluded entirely; a live prediction
/// or delay overrides the scheduled time; a trip-level delay covers stops
/// without their own update; otherwise the timetable stands. Entries already
/// due are dropped, and the result is sorted ascending by due time.
pub fn upcoming(
    index: &ScheduleIndex,
    live: &LiveSnapshot,
    config: &MergeConfig,
    stops: &[String],
    now: DateTime<Utc>,
    filter: SourceFilter,
) -> Vec<UpcomingEntry> {
    let stop_ids: Vec<&str> = if stops.is_empty() {
        index.stop_ids().collect()
    } else {
        stops.iter().map(String::as_str).collect()
    };
    let to = now + config.horizon;

    let mut out = Vec::new();
    for stop_id in stop_ids {
        for dep in index.departures_between(stop_id, now, to, config.timezone) {
            let resolved = if filter == SourceFilter::Schedule {
                Some((dep.departs, Source::Schedule))
            } else {
                resolve_live(live, &dep.trip.id, stop_id, dep.stop_time.sequence, dep.departs)
            };
            let Some((due, source)) = resolved else {
                continue;
            };
            if filter == SourceFilter::Live && source != Source::Live {
                continue;
            }
            let due_in_seconds = (due - now).num_seconds();
            if due_in_seconds < 0 {
                continue;
            }

            out.push(UpcomingEntry {
                trip_id: dep.trip.id.clone(),
                route: dep.route.label().to_string(),
                route_type: dep.route.route_type,
                headsign: dep.trip.headsign.clone(),
                direction: dep.trip.direction,
                stop_id: stop_id.to_string(),
                due_time: due.with_timezone(&config.timezone).format("%H:%M:%S").to_string(),
                due_in_seconds,
                source,
            });
        }
    }

    out.sort_by(|a, b| {
        a.due_in_seconds
            .cmp(&b.due_in_seconds)
            .then_with(|| a.trip_id.cmp(&b.trip_id))
            .then_with(|| a.stop_id.cmp(&b.stop_id))
    });
    out
}

/// Apply the snapshot to one scheduled departure.
///
/// `None` means the departure must not be reported at all.
fn resolve_live(
    live: &LiveSnapshot,
    trip_id: &str,
    stop_id: &str,
    sequence: u32,
    scheduled: DateTime<Utc>,
) -> Option<(DateTime<Utc>, Source)> {
    if live.is_trip_canceled(trip_id) {
        return None;
    }

    match live.update_for(trip_id, stop_id, sequence) {
        Some(update) => match update.status {
            UpdateStatus::Skipped | UpdateStatus::Canceled => None,
            UpdateStatus::NoData => Some((scheduled, Source::Schedule)),
            UpdateStatus::Scheduled => {
                if let Some(predicted) = update.predicted {
                    Some((predicted, Source::Live))
                } else if let Some(delay) = update.delay_seconds {
                    Some((scheduled + Duration::seconds(i64::from(delay)), Source::Live))
                } else {
                    // An update carrying no time of its own still leaves the
                    // trip-level delay in force.
                    Some(delayed_or_scheduled(live, trip_id, scheduled))
                }
            }
        },
        None => Some(delayed_or_scheduled(live, trip_id, scheduled)),
    }
}

fn delayed_or_scheduled(
    live: &LiveSnapshot,
    trip_id: &str,
    scheduled: DateTime<Utc>,
) -> (DateTime<Utc>, Source) {
    match live.trip_delay(trip_id) {
        Some(delay) => (scheduled + Duration::seconds(i64::from(delay)), Source::Live),
        None => (scheduled, Source::Schedule),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::{LiveUpdate, TripLive};
    use crate::schedule::{
        Agency, Calendar, Route, ScheduleTables, Stop, StopTime, Trip,
    };
    use crate::domain::ServiceTime;
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::Europe::Dublin;
    use std::collections::HashMap;

    fn route(id: &str, short_name: &str) -> Route {
        Route {
            id: id.to_string(),
            short_name: short_name.to_string(),
            long_name: String::new(),
            route_type: RouteType::Bus,
        }
    }

    fn trip(id: &str, route_id: &str) -> Trip {
        Trip {
            id: id.to_string(),
            route_id: route_id.to_string(),
            service_id: "DAILY".to_string(),
            headsign: format!("{id} headsign"),
            direction: 0,
        }
    }

    fn stop_time(trip_id: &str, stop_id: &str, sequence: u32, departure: &str) -> StopTime {
        let t = ServiceTime::parse(departure).unwrap();
        StopTime {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
            sequence,
            arrival: t,
            departure: t,
        }
    }

    /// One stop, three trips due 20:57:01 / 20:58:30 / 21:00:00.
    fn index() -> ScheduleIndex {
        ScheduleIndex::build(
            ScheduleTables {
                agencies: vec![Agency {
                    id: "A1".to_string(),
                    name: "Dublin Bus".to_string(),
                    timezone: "Europe/Dublin".to_string(),
                }],
                routes: vec![route("R1", "46A"), route("R2", "145")],
                stops: vec![
                    Stop {
                        id: "S1".to_string(),
                        name: "Abbey Street".to_string(),
                        lat: None,
                        lon: None,
                    },
                    Stop {
                        id: "S2".to_string(),
                        name: "Merrion Square".to_string(),
                        lat: None,
                        lon: None,
                    },
                ],
                calendars: vec![Calendar {
                    service_id: "DAILY".to_string(),
                    days: [true; 7],
                    start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                }],
                exceptions: Vec::new(),
                trips: vec![trip("T1", "R1"), trip("T2", "R2"), trip("T3", "R1")],
                stop_times: vec![
                    stop_time("T1", "S1", 1, "20:57:01"),
                    stop_time("T2", "S1", 1, "20:58:30"),
                    stop_time("T3", "S1", 1, "21:00:00"),
                    stop_time("T1", "S2", 2, "21:10:00"),
                ],
            },
            false,
        )
    }

    fn snapshot(trips: Vec<(&str, TripLive)>) -> LiveSnapshot {
        let map: HashMap<String, TripLive> = trips
            .into_iter()
            .map(|(id, t)| (id.to_string(), t))
            .collect();
        LiveSnapshot::new(None, None, map)
    }

    fn live_update(
        trip_id: &str,
        stop_id: &str,
        status: UpdateStatus,
        predicted: Option<DateTime<Utc>>,
        delay_seconds: Option<i32>,
    ) -> LiveUpdate {
        LiveUpdate {
            trip_id: trip_id.to_string(),
            stop_id: Some(stop_id.to_string()),
            stop_sequence: None,
            status,
            predicted,
            delay_seconds,
        }
    }

    fn config() -> MergeConfig {
        MergeConfig::new(Dublin)
    }

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // 2026-03-02 is a Monday; Dublin is on UTC+0 in March.
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, s).unwrap()
    }

    fn stops(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn schedule_only_entry() {
        let entries = upcoming(
            &index(),
            &LiveSnapshot::empty(),
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].trip_id, "T1");
        assert_eq!(entries[0].due_time, "20:57:01");
        assert_eq!(entries[0].due_in_seconds, 421);
        assert_eq!(entries[0].source, Source::Schedule);
        assert_eq!(entries[0].route, "46A");
        assert_eq!(entries[0].route_type, RouteType::Bus);
    }

    #[test]
    fn live_prediction_overrides_schedule() {
        // T1 scheduled 20:57:01, predicted 20:58:31.
        let live = snapshot(vec![(
            "T1",
            TripLive {
                updates: vec![live_update(
                    "T1",
                    "S1",
                    UpdateStatus::Scheduled,
                    Some(utc(20, 58, 31)),
                    None,
                )],
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        let t1 = entries.iter().find(|e| e.trip_id == "T1").unwrap();
        assert_eq!(t1.due_time, "20:58:31");
        assert_eq!(t1.due_in_seconds, 511);
        assert_eq!(t1.source, Source::Live);
        // The live shift reorders T1 after T2's 20:58:30.
        assert_eq!(entries[0].trip_id, "T2");
    }

    #[test]
    fn delay_applies_to_scheduled_time() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                updates: vec![live_update(
                    "T1",
                    "S1",
                    UpdateStatus::Scheduled,
                    None,
                    Some(89),
                )],
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        let t1 = entries.iter().find(|e| e.trip_id == "T1").unwrap();
        assert_eq!(t1.due_time, "20:58:30");
        assert_eq!(t1.source, Source::Live);
    }

    #[test]
    fn canceled_trip_is_absent() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                canceled: true,
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        assert!(entries.iter().all(|e| e.trip_id != "T1"));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn skipped_stop_is_absent_but_rest_of_trip_remains() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                updates: vec![live_update("T1", "S1", UpdateStatus::Skipped, None, None)],
                ..TripLive::default()
            },
        )]);

        let at_s1 = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );
        assert!(at_s1.iter().all(|e| e.trip_id != "T1"));

        // The same trip still calls at its later stop.
        let at_s2 = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S2"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );
        assert!(at_s2.iter().any(|e| e.trip_id == "T1"));
    }

    #[test]
    fn no_data_falls_back_to_schedule() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                updates: vec![live_update("T1", "S1", UpdateStatus::NoData, None, None)],
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        let t1 = entries.iter().find(|e| e.trip_id == "T1").unwrap();
        assert_eq!(t1.due_time, "20:57:01");
        assert_eq!(t1.source, Source::Schedule);
    }

    #[test]
    fn trip_level_delay_covers_stops_without_updates() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                delay_seconds: Some(60),
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        let t1 = entries.iter().find(|e| e.trip_id == "T1").unwrap();
        assert_eq!(t1.due_time, "20:58:01");
        assert_eq!(t1.source, Source::Live);
    }

    #[test]
    fn trip_level_delay_survives_an_empty_stop_update() {
        // The per-stop update names the stop but carries neither a predicted
        // time nor a delay; the trip-level delay still applies.
        let live = snapshot(vec![(
            "T1",
            TripLive {
                delay_seconds: Some(60),
                updates: vec![live_update("T1", "S1", UpdateStatus::Scheduled, None, None)],
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        let t1 = entries.iter().find(|e| e.trip_id == "T1").unwrap();
        assert_eq!(t1.due_time, "20:58:01");
        assert_eq!(t1.source, Source::Live);
    }

    #[test]
    fn loop_trip_appears_once_per_stop() {
        let index = ScheduleIndex::build(
            ScheduleTables {
                agencies: Vec::new(),
                routes: vec![route("R1", "17")],
                stops: vec![Stop {
                    id: "S1".to_string(),
                    name: "Abbey Street".to_string(),
                    lat: None,
                    lon: None,
                }],
                calendars: vec![Calendar {
                    service_id: "DAILY".to_string(),
                    days: [true; 7],
                    start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                }],
                exceptions: Vec::new(),
                trips: vec![trip("LOOP", "R1")],
                stop_times: vec![
                    stop_time("LOOP", "S1", 1, "21:00:00"),
                    stop_time("LOOP", "S1", 3, "21:20:00"),
                ],
            },
            false,
        );

        let entries = upcoming(
            &index,
            &LiveSnapshot::empty(),
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        // Both visits fall inside the horizon; only the earliest is reported.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].due_time, "21:00:00");
    }

    #[test]
    fn already_due_entries_are_excluded() {
        let entries = upcoming(
            &index(),
            &LiveSnapshot::empty(),
            &config(),
            &stops(&["S1"]),
            utc(20, 59, 0),
            SourceFilter::Both,
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trip_id, "T3");
    }

    #[test]
    fn horizon_bounds_the_result() {
        let cfg = config().with_horizon(Duration::minutes(2));
        let entries = upcoming(
            &index(),
            &LiveSnapshot::empty(),
            &cfg,
            &stops(&["S1"]),
            utc(20, 56, 0),
            SourceFilter::Both,
        );

        // 20:57:01 is inside the 2-minute horizon, 20:58:30 is not.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trip_id, "T1");
    }

    #[test]
    fn schedule_filter_ignores_the_snapshot() {
        let live = snapshot(vec![(
            "T1",
            TripLive {
                canceled: true,
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Schedule,
        );

        // The cancellation is invisible to the schedule-only view.
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.source == Source::Schedule));
    }

    #[test]
    fn live_filter_keeps_only_live_entries() {
        let live = snapshot(vec![(
            "T2",
            TripLive {
                updates: vec![live_update(
                    "T2",
                    "S1",
                    UpdateStatus::Scheduled,
                    None,
                    Some(30),
                )],
                ..TripLive::default()
            },
        )]);

        let entries = upcoming(
            &index(),
            &live,
            &config(),
            &stops(&["S1"]),
            utc(20, 50, 0),
            SourceFilter::Live,
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].trip_id, "T2");
        assert_eq!(entries[0].source, Source::Live);
    }

    #[test]
    fn empty_stop_list_means_all_stops() {
        let entries = upcoming(
            &index(),
            &LiveSnapshot::empty(),
            &config(),
            &[],
            utc(20, 50, 0),
            SourceFilter::Both,
        );

        assert!(entries.iter().any(|e| e.stop_id == "S1"));
        assert!(entries.iter().any(|e| e.stop_id == "S2"));
    }

    #[test]
    fn unknown_stop_yields_empty_result() {
        let entries = upcoming(
            &index(),
            &LiveSnapshot::empty(),
            &config(),
            &stops(&["NO_SUCH_STOP"]),
            utc(20, 50, 0),
            SourceFilter::Both,
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn result_is_sorted_and_idempotent() {
        let run = || {
            upcoming(
                &index(),
                &LiveSnapshot::empty(),
                &config(),
                &[],
                utc(20, 50, 0),
                SourceFilter::Both,
            )
        };
        let a = run();
        let b = run();
        assert_eq!(a, b);
        assert!(a.windows(2).all(|w| w[0].due_in_seconds <= w[1].due_in_seconds));
    }

    #[test]
    fn post_midnight_departure_from_yesterdays_service() {
        let index = ScheduleIndex::build(
            ScheduleTables {
                agencies: Vec::new(),
                routes: vec![route("R1", "N1")],
                stops: vec![Stop {
                    id: "S1".to_string(),
                    name: "Abbey Street".to_string(),
                    lat: None,
                    lon: None,
                }],
                calendars: vec![Calendar {
                    service_id: "DAILY".to_string(),
                    days: [true; 7],
                    start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
                }],
                exceptions: Vec::new(),
                trips: vec![trip("NIGHT", "R1")],
                stop_times: vec![stop_time("NIGHT", "S1", 1, "25:30:00")],
            },
            false,
        );

        // 01:10 local; the 25:30:00 offset from yesterday's service day is
        // due at 01:30, in 20 minutes.
        let now = Utc.with_ymd_and_hms(2026, 3, 3, 1, 10, 0).unwrap();
        let entries = upcoming(
            &index,
            &LiveSnapshot::empty(),
            &config(),
            &stops(&["S1"]),
            now,
            SourceFilter::Both,
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].due_time, "01:30:00");
        assert_eq!(entries[0].due_in_seconds, 20 * 60);
    }
}
