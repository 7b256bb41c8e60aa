//! The record parser: one raw CSV row in, one typed record out.
//!
//! Parsing is pure and per-row; the chunked loader decides which rows reach
//! it and what happens to the failures. Optional GTFS columns vary across
//! providers, so every record substitutes defined defaults for absent
//! optional fields and only fails on missing *required* data.

use chrono::NaiveDate;

use crate::domain::{RouteType, ServiceTime};

use super::error::MalformedRow;

/// Header-name to field-index mapping for one table.
///
/// Built once per file from the header row and shared (read-only) by all
/// parse workers.
#[derive(Debug, Clone)]
pub struct Columns {
    names: Vec<String>,
}

impl Columns {
    /// Build from a parsed header record. A UTF-8 BOM on the first header
    /// cell is stripped; some NTA exports carry one.
    pub fn from_header(header: &csv::StringRecord) -> Self {
        let names = header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let name = if i == 0 {
                    name.trim_start_matches('\u{feff}')
                } else {
                    name
                };
                name.trim().to_string()
            })
            .collect();
        Self { names }
    }

    /// Look up a field by column name. `None` if the column is absent from
    /// this table or the row is short.
    pub fn get<'r>(&self, row: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
        let idx = self.names.iter().position(|n| n == name)?;
        row.get(idx)
    }
}

/// A non-empty optional field, or `None`.
fn optional<'r>(cols: &Columns, row: &'r csv::StringRecord, name: &str) -> Option<&'r str> {
    cols.get(row, name).filter(|v| !v.is_empty())
}

/// A required field; missing or empty is a [`MalformedRow`].
fn required<'r>(
    cols: &Columns,
    row: &'r csv::StringRecord,
    name: &'static str,
    table: &'static str,
    line: u64,
) -> Result<&'r str, MalformedRow> {
    optional(cols, row, name)
        .ok_or_else(|| MalformedRow::new(table, line, format!("missing required field {name}")))
}

fn parse_date(
    value: &str,
    name: &str,
    table: &'static str,
    line: u64,
) -> Result<NaiveDate, MalformedRow> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|_| MalformedRow::new(table, line, format!("bad {name} date {value:?}")))
}

fn parse_service_time(
    value: &str,
    name: &str,
    table: &'static str,
    line: u64,
) -> Result<ServiceTime, MalformedRow> {
    ServiceTime::parse(value)
        .map_err(|e| MalformedRow::new(table, line, format!("bad {name} {value:?}: {e}")))
}

/// A typed record of one GTFS table.
pub trait Record: Sized + Send {
    /// Table file name within the GTFS directory, e.g. `trips.txt`.
    const TABLE: &'static str;

    /// Parse one data row. `line` is the 1-based file line for error reports.
    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow>;
}

/// An operator of routes (`agency.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Agency {
    /// May be empty: `agency_id` is optional for single-agency feeds.
    pub id: String,
    pub name: String,
    pub timezone: String,
}

impl Record for Agency {
    const TABLE: &'static str = "agency.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        Ok(Agency {
            id: optional(cols, row, "agency_id").unwrap_or_default().to_string(),
            name: required(cols, row, "agency_name", Self::TABLE, line)?.to_string(),
            timezone: required(cols, row, "agency_timezone", Self::TABLE, line)?.to_string(),
        })
    }
}

/// A transit line (`routes.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub route_type: RouteType,
}

impl Route {
    /// The label served to clients: the short name, or the long name for
    /// routes that have no short name.
    pub fn label(&self) -> &str {
        if self.short_name.is_empty() {
            &self.long_name
        } else {
            &self.short_name
        }
    }
}

impl Record for Route {
    const TABLE: &'static str = "routes.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let code = required(cols, row, "route_type", Self::TABLE, line)?;
        let route_type = RouteType::from_gtfs_code(code).ok_or_else(|| {
            MalformedRow::new(Self::TABLE, line, format!("unknown route_type {code:?}"))
        })?;

        Ok(Route {
            id: required(cols, row, "route_id", Self::TABLE, line)?.to_string(),
            short_name: optional(cols, row, "route_short_name")
                .unwrap_or_default()
                .to_string(),
            long_name: optional(cols, row, "route_long_name")
                .unwrap_or_default()
                .to_string(),
            route_type,
        })
    }
}

/// A physical stop or station (`stops.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Record for Stop {
    const TABLE: &'static str = "stops.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let coord = |name: &'static str| -> Result<Option<f64>, MalformedRow> {
            optional(cols, row, name)
                .map(|v| {
                    v.trim().parse().map_err(|_| {
                        MalformedRow::new(Self::TABLE, line, format!("bad {name} {v:?}"))
                    })
                })
                .transpose()
        };

        Ok(Stop {
            id: required(cols, row, "stop_id", Self::TABLE, line)?.to_string(),
            name: optional(cols, row, "stop_name").unwrap_or_default().to_string(),
            lat: coord("stop_lat")?,
            lon: coord("stop_lon")?,
        })
    }
}

/// A single scheduled run of a route (`trips.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Trip {
    pub id: String,
    pub route_id: String,
    pub service_id: String,
    pub headsign: String,
    pub direction: u8,
}

impl Record for Trip {
    const TABLE: &'static str = "trips.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let direction = match optional(cols, row, "direction_id") {
            None => 0,
            Some(v) => v.parse().map_err(|_| {
                MalformedRow::new(Self::TABLE, line, format!("bad direction_id {v:?}"))
            })?,
        };

        Ok(Trip {
            id: required(cols, row, "trip_id", Self::TABLE, line)?.to_string(),
            route_id: required(cols, row, "route_id", Self::TABLE, line)?.to_string(),
            service_id: required(cols, row, "service_id", Self::TABLE, line)?.to_string(),
            headsign: optional(cols, row, "trip_headsign")
                .unwrap_or_default()
                .to_string(),
            direction,
        })
    }
}

/// A trip's scheduled visit to a stop (`stop_times.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub sequence: u32,
    pub arrival: ServiceTime,
    pub departure: ServiceTime,
}

impl Record for StopTime {
    const TABLE: &'static str = "stop_times.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let sequence = required(cols, row, "stop_sequence", Self::TABLE, line)?;
        let sequence = sequence.parse().map_err(|_| {
            MalformedRow::new(Self::TABLE, line, format!("bad stop_sequence {sequence:?}"))
        })?;

        // Either time may be blank for untimed intermediate stops; fall back
        // to the other. Both blank is unusable.
        let arrival = optional(cols, row, "arrival_time");
        let departure = optional(cols, row, "departure_time");
        let (arrival, departure) = match (arrival, departure) {
            (Some(a), Some(d)) => (
                parse_service_time(a, "arrival_time", Self::TABLE, line)?,
                parse_service_time(d, "departure_time", Self::TABLE, line)?,
            ),
            (Some(a), None) => {
                let t = parse_service_time(a, "arrival_time", Self::TABLE, line)?;
                (t, t)
            }
            (None, Some(d)) => {
                let t = parse_service_time(d, "departure_time", Self::TABLE, line)?;
                (t, t)
            }
            (None, None) => {
                return Err(MalformedRow::new(
                    Self::TABLE,
                    line,
                    "neither arrival_time nor departure_time set",
                ));
            }
        };

        Ok(StopTime {
            trip_id: required(cols, row, "trip_id", Self::TABLE, line)?.to_string(),
            stop_id: required(cols, row, "stop_id", Self::TABLE, line)?.to_string(),
            sequence,
            arrival,
            departure,
        })
    }
}

/// Weekly service pattern (`calendar.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub service_id: String,
    /// Monday-first weekday availability.
    pub days: [bool; 7],
    pub start: NaiveDate,
    pub end: NaiveDate,
}

const CALENDAR_DAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

impl Record for Calendar {
    const TABLE: &'static str = "calendar.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let mut days = [false; 7];
        for (i, name) in CALENDAR_DAYS.iter().enumerate() {
            let v = cols.get(row, name).unwrap_or("0");
            days[i] = match v {
                "1" => true,
                "0" | "" => false,
                other => {
                    return Err(MalformedRow::new(
                        Self::TABLE,
                        line,
                        format!("bad {name} flag {other:?}"),
                    ));
                }
            };
        }

        let start = required(cols, row, "start_date", Self::TABLE, line)?;
        let end = required(cols, row, "end_date", Self::TABLE, line)?;

        Ok(Calendar {
            service_id: required(cols, row, "service_id", Self::TABLE, line)?.to_string(),
            days,
            start: parse_date(start, "start_date", Self::TABLE, line)?,
            end: parse_date(end, "end_date", Self::TABLE, line)?,
        })
    }
}

/// A calendar exception kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    /// Service added for the date (`exception_type` 1).
    Added,
    /// Service removed for the date (`exception_type` 2).
    Removed,
}

/// A dated exception to a weekly pattern (`calendar_dates.txt`).
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDate {
    pub service_id: String,
    pub date: NaiveDate,
    pub exception: Exception,
}

impl Record for CalendarDate {
    const TABLE: &'static str = "calendar_dates.txt";

    fn parse(cols: &Columns, row: &csv::StringRecord, line: u64) -> Result<Self, MalformedRow> {
        let date = required(cols, row, "date", Self::TABLE, line)?;
        let exception = match required(cols, row, "exception_type", Self::TABLE, line)? {
            "1" => Exception::Added,
            "2" => Exception::Removed,
            other => {
                return Err(MalformedRow::new(
                    Self::TABLE,
                    line,
                    format!("bad exception_type {other:?}"),
                ));
            }
        };

        Ok(CalendarDate {
            service_id: required(cols, row, "service_id", Self::TABLE, line)?.to_string(),
            date: parse_date(date, "date", Self::TABLE, line)?,
            exception,
        })
    }
}
