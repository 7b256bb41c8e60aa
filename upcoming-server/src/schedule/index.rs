//! The queryable in-memory schedule.
//!
//! Built once from the parsed tables and then never mutated; every query
//! borrows from the index. A reload builds a fresh index off the request
//! path and publishes it through [`SharedSchedule`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::records::{Agency, Calendar, CalendarDate, Exception, Route, Stop, StopTime, Trip};

/// The parsed tables of one GTFS directory, ready for indexing.
pub struct ScheduleTables {
    pub agencies: Vec<Agency>,
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub calendars: Vec<Calendar>,
    pub exceptions: Vec<CalendarDate>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
}

/// A scheduled departure resolved to a concrete instant.
#[derive(Debug, Clone)]
pub struct Departure<'a> {
    pub trip: &'a Trip,
    pub route: &'a Route,
    pub stop_time: &'a StopTime,
    /// The service date the departure belongs to; distinct from the civil
    /// date for post-midnight stop times.
    pub service_date: NaiveDate,
    pub departs: DateTime<Utc>,
}

/// Read-only index over one loaded GTFS schedule.
#[derive(Debug, Default, PartialEq)]
pub struct ScheduleIndex {
    agencies: HashMap<String, Agency>,
    routes: HashMap<String, Route>,
    stops: HashMap<String, Stop>,
    trips: HashMap<String, Trip>,
    calendars: HashMap<String, Calendar>,
    exceptions: HashMap<String, HashMap<NaiveDate, Exception>>,
    /// Stop times per trip, ordered by stop sequence.
    by_trip: HashMap<String, Vec<StopTime>>,
    /// Stop times per stop, ordered by departure offset.
    by_stop: HashMap<String, Vec<StopTime>>,
}

impl ScheduleIndex {
    /// Index the parsed tables.
    ///
    /// Referential integrity is enforced here rather than at parse time:
    /// trips pointing at unknown routes are dropped, as are trips left with
    /// no stop times and (when `allowlist_active`) stops no surviving stop
    /// time references. Duplicate ids keep the last occurrence, matching the
    /// file as the source of truth.
    pub fn build(tables: ScheduleTables, allowlist_active: bool) -> Self {
        let ScheduleTables {
            agencies,
            routes,
            stops,
            calendars,
            exceptions,
            trips,
            stop_times,
        } = tables;

        let routes: HashMap<String, Route> =
            routes.into_iter().map(|r| (r.id.clone(), r)).collect();

        let mut trip_map = HashMap::with_capacity(trips.len());
        for trip in trips {
            if !routes.contains_key(&trip.route_id) {
                debug!(trip_id = %trip.id, route_id = %trip.route_id, "dropping trip with unknown route");
                continue;
            }
            trip_map.insert(trip.id.clone(), trip);
        }

        let mut by_trip: HashMap<String, Vec<StopTime>> = HashMap::new();
        for st in stop_times {
            if trip_map.contains_key(&st.trip_id) {
                by_trip.entry(st.trip_id.clone()).or_default().push(st);
            }
        }
        for times in by_trip.values_mut() {
            times.sort_by_key(|st| st.sequence);
            // At most one visit per (trip, sequence); later rows win, as
            // elsewhere for duplicate keys.
            times.reverse();
            times.dedup_by_key(|st| st.sequence);
            times.reverse();
        }

        // A trip with no retained stop times serves nothing; under an
        // allowlist this is the transitive drop the filter implies.
        trip_map.retain(|id, _| by_trip.contains_key(id));

        let mut by_stop: HashMap<String, Vec<StopTime>> = HashMap::new();
        for times in by_trip.values() {
            for st in times {
                by_stop.entry(st.stop_id.clone()).or_default().push(st.clone());
            }
        }
        for times in by_stop.values_mut() {
            times.sort_by(|a, b| {
                a.departure
                    .cmp(&b.departure)
                    .then_with(|| a.trip_id.cmp(&b.trip_id))
                    .then_with(|| a.sequence.cmp(&b.sequence))
            });
        }

        let stops: HashMap<String, Stop> = stops
            .into_iter()
            .filter(|s| !allowlist_active || by_stop.contains_key(&s.id))
            .map(|s| (s.id.clone(), s))
            .collect();

        let agencies: HashMap<String, Agency> =
            agencies.into_iter().map(|a| (a.id.clone(), a)).collect();
        let calendars: HashMap<String, Calendar> = calendars
            .into_iter()
            .map(|c| (c.service_id.clone(), c))
            .collect();

        let mut exception_map: HashMap<String, HashMap<NaiveDate, Exception>> = HashMap::new();
        for cd in exceptions {
            exception_map
                .entry(cd.service_id)
                .or_default()
                .insert(cd.date, cd.exception);
        }

        let index = Self {
            agencies,
            routes,
            stops,
            trips: trip_map,
            calendars,
            exceptions: exception_map,
            by_trip,
            by_stop,
        };
        info!(
            routes = index.route_count(),
            stops = index.stop_count(),
            trips = index.trip_count(),
            stop_times = index.stop_time_count(),
            "schedule index built"
        );
        index
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn agency(&self, agency_id: &str) -> Option<&Agency> {
        self.agencies.get(agency_id)
    }

    /// The trip's stop times in stop-sequence order. Empty for unknown trips.
    pub fn stop_times_for_trip(&self, trip_id: &str) -> &[StopTime] {
        self.by_trip.get(trip_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every trip's visit to the stop, ordered by departure offset. Empty for
    /// unknown stops.
    pub fn stop_times_for_stop(&self, stop_id: &str) -> &[StopTime] {
        self.by_stop.get(stop_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn stop_ids(&self) -> impl Iterator<Item = &str> {
        self.by_stop.keys().map(String::as_str)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub fn stop_time_count(&self) -> usize {
        self.by_trip.values().map(Vec::len).sum()
    }

    /// The feed's reference timezone: the lexically first agency's, so the
    /// choice is stable across loads. `None` when `agency.txt` is absent.
    pub fn default_timezone(&self) -> Option<&str> {
        self.agencies
            .iter()
            .min_by_key(|(id, _)| id.as_str())
            .map(|(_, a)| a.timezone.as_str())
    }

    /// Whether the service runs on the given service date.
    ///
    /// A dated exception always wins over the weekly pattern; with no
    /// exception, the date must sit inside the calendar's range and on an
    /// enabled weekday. Unknown service ids (exception-only services with no
    /// `calendar.txt` row) run only on their `Added` dates.
    pub fn is_service_active(&self, service_id: &str, date: NaiveDate) -> bool {
        match self
            .exceptions
            .get(service_id)
            .and_then(|dates| dates.get(&date))
        {
            Some(Exception::Added) => return true,
            Some(Exception::Removed) => return false,
            None => {}
        }
        let Some(cal) = self.calendars.get(service_id) else {
            return false;
        };
        if date < cal.start || date > cal.end {
            return false;
        }
        cal.days[date.weekday().num_days_from_monday() as usize]
    }

    /// Scheduled departures from a stop within `[from, to]`.
    ///
    /// Stop-time offsets can exceed 24h, so a departure inside the window may
    /// belong to the previous civil day's service: each candidate service
    /// date from the day before the window through its end is checked. A
    /// trip's visit to the stop is reported once, for the earliest service
    /// date that produces it.
    pub fn departures_between(
        &self,
        stop_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        tz: Tz,
    ) -> Vec<Departure<'_>> {
        let mut out = Vec::new();
        if to < from {
            return out;
        }

        let first_date = from
            .with_timezone(&tz)
            .date_naive()
            .checked_sub_days(Days::new(1));
        let last_date = to.with_timezone(&tz).date_naive();
        let Some(mut date) = first_date else {
            return out;
        };

        while date <= last_date {
            for st in self.stop_times_for_stop(stop_id) {
                let Some(trip) = self.trips.get(&st.trip_id) else {
                    continue;
                };
                if !self.is_service_active(&trip.service_id, date) {
                    continue;
                }
                let Some(departs) = st.departure.to_utc(date, tz) else {
                    continue;
                };
                if departs < from || departs > to {
                    continue;
                }
                let Some(route) = self.routes.get(&trip.route_id) else {
                    continue;
                };
                out.push(Departure {
                    trip,
                    route,
                    stop_time: st,
                    service_date: date,
                    departs,
                });
            }
            date = match date.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => break,
            };
        }

        out.sort_by(|a, b| {
            a.departs
                .cmp(&b.departs)
                .then_with(|| a.trip.id.cmp(&b.trip.id))
                .then_with(|| a.stop_time.sequence.cmp(&b.stop_time.sequence))
        });
        // One departure per (trip, stop): every candidate here shares the
        // queried stop, so the key is the trip id. Post-sort, so a loop trip
        // (or a trip reachable from two service days) keeps its earliest
        // visit only.
        let mut seen: HashSet<&str> = HashSet::new();
        out.retain(|d| seen.insert(d.trip.id.as_str()));
        out
    }
}

/// Handle for atomically publishing a new schedule to concurrent readers.
///
/// Readers clone an `Arc` of the current index and keep using it even while
/// a replacement is swapped in, so a reload never blocks queries mid-flight.
#[derive(Clone)]
pub struct SharedSchedule {
    inner: Arc<RwLock<Arc<ScheduleIndex>>>,
}

impl SharedSchedule {
    pub fn new(index: ScheduleIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(index))),
        }
    }

    /// The current index. Cheap; clones the `Arc`, not the data.
    pub async fn load(&self) -> Arc<ScheduleIndex> {
        self.inner.read().await.clone()
    }

    /// Publish a freshly built index, atomically replacing the old one.
    pub async fn replace(&self, index: ScheduleIndex) {
        *self.inner.write().await = Arc::new(index);
    }
}
