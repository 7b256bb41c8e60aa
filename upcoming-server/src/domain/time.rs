//! GTFS stop-time handling.
//!
//! GTFS gives stop times as "HH:MM:SS" offsets from *service midnight*, and
//! the hour field may exceed 23 for trips that run past midnight (e.g.
//! "25:30:00" is 01:30 on the day after the service day). This module keeps
//! that offset intact and only converts to a wall-clock instant when a
//! concrete service date is known.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Error returned when parsing an invalid time string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time: {reason}")]
pub struct TimeError {
    reason: &'static str,
}

impl TimeError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// A stop-time offset in seconds since service midnight.
///
/// Unlike a time of day, this may be 24 hours or more. The offset is never
/// normalised; `25:30:00` stays `25:30:00` until it is resolved against a
/// service date with [`ServiceTime::on_service_date`] or
/// [`ServiceTime::to_utc`].
///
/// # Examples
///
/// ```
/// use upcoming_server::domain::ServiceTime;
///
/// let t = ServiceTime::parse("25:30:00").unwrap();
/// assert_eq!(t.seconds(), 25 * 3600 + 30 * 60);
/// assert_eq!(t.to_string(), "25:30:00");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime {
    seconds: u32,
}

impl ServiceTime {
    /// Create a ServiceTime from a raw second offset.
    pub fn from_seconds(seconds: u32) -> Self {
        Self { seconds }
    }

    /// Parse an "H:MM:SS" / "HH:MM:SS" string. Hours may exceed 23.
    ///
    /// Some feeds zero-pad hours and some do not; both forms are accepted.
    pub fn parse(s: &str) -> Result<Self, TimeError> {
        let mut parts = s.split(':');
        let hour = parse_field(parts.next(), 1, 3)?;
        let minute = parse_field(parts.next(), 2, 2)?;
        let second = parse_field(parts.next(), 2, 2)?;

        if parts.next().is_some() {
            return Err(TimeError::new("expected HH:MM:SS format"));
        }
        if minute > 59 {
            return Err(TimeError::new("minute must be 0-59"));
        }
        if second > 59 {
            return Err(TimeError::new("second must be 0-59"));
        }

        Ok(Self {
            seconds: hour * 3600 + minute * 60 + second,
        })
    }

    /// The raw offset in seconds since service midnight.
    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    /// The (possibly >= 24) hour component.
    pub fn hour(&self) -> u32 {
        self.seconds / 3600
    }

    /// The minute component (0-59).
    pub fn minute(&self) -> u32 {
        (self.seconds % 3600) / 60
    }

    /// The second component (0-59).
    pub fn second(&self) -> u32 {
        self.seconds % 60
    }

    /// Resolve this offset against a service date, producing a naive local
    /// datetime. Offsets past 24:00:00 land on the following calendar day.
    pub fn on_service_date(&self, date: NaiveDate) -> Option<chrono::NaiveDateTime> {
        date.and_time(NaiveTime::MIN)
            .checked_add_signed(Duration::seconds(i64::from(self.seconds)))
    }

    /// Resolve this offset against a service date in the given timezone and
    /// convert to a UTC instant.
    ///
    /// Returns `None` for the rare local times that do not exist (DST spring
    /// forward) or overflow.
    pub fn to_utc(&self, service_date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
        let naive = self.on_service_date(service_date)?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Parse one colon-separated field with a digit-count bound.
fn parse_field(field: Option<&str>, min_len: usize, max_len: usize) -> Result<u32, TimeError> {
    let field = field.ok_or_else(|| TimeError::new("expected HH:MM:SS format"))?;
    if field.len() < min_len || field.len() > max_len {
        return Err(TimeError::new("wrong field width"));
    }
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeError::new("non-digit character"));
    }
    field
        .parse()
        .map_err(|_| TimeError::new("non-digit character"))
}

impl fmt::Debug for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceTime({self})")
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::Europe::Dublin;

    #[test]
    fn parse_valid_times() {
        let t = ServiceTime::parse("00:00:00").unwrap();
        assert_eq!(t.seconds(), 0);

        let t = ServiceTime::parse("14:30:15").unwrap();
        assert_eq!(t.hour(), 14);
        assert_eq!(t.minute(), 30);
        assert_eq!(t.second(), 15);

        // Single-digit hour, as in some NTA exports
        let t = ServiceTime::parse("9:05:00").unwrap();
        assert_eq!(t.hour(), 9);
        assert_eq!(t.minute(), 5);
    }

    #[test]
    fn parse_past_midnight() {
        let t = ServiceTime::parse("25:30:00").unwrap();
        assert_eq!(t.hour(), 25);
        assert_eq!(t.seconds(), 25 * 3600 + 30 * 60);
    }

    #[test]
    fn parse_invalid() {
        assert!(ServiceTime::parse("").is_err());
        assert!(ServiceTime::parse("14:30").is_err());
        assert!(ServiceTime::parse("14:30:00:00").is_err());
        assert!(ServiceTime::parse("14:60:00").is_err());
        assert!(ServiceTime::parse("14:30:60").is_err());
        assert!(ServiceTime::parse("ab:cd:ef").is_err());
        assert!(ServiceTime::parse("14:3:00").is_err());
        assert!(ServiceTime::parse("-1:30:00").is_err());
    }

    #[test]
    fn display_keeps_large_hours() {
        assert_eq!(ServiceTime::parse("25:30:00").unwrap().to_string(), "25:30:00");
        assert_eq!(ServiceTime::parse("9:05:07").unwrap().to_string(), "09:05:07");
    }

    #[test]
    fn on_service_date_crosses_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let t = ServiceTime::parse("25:30:00").unwrap();

        let dt = t.on_service_date(date).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2026, 3, 16).unwrap());
        assert_eq!(dt.time(), NaiveTime::from_hms_opt(1, 30, 0).unwrap());
    }

    #[test]
    fn to_utc_applies_timezone() {
        // Irish Standard Time in July is UTC+1.
        let date = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        let t = ServiceTime::parse("08:30:00").unwrap();

        let dt = t.to_utc(date, Dublin).unwrap();
        assert_eq!(dt.hour(), 7);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn to_utc_past_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let t = ServiceTime::parse("25:30:00").unwrap();

        // Dublin in January is UTC+0; 25:30 on the 15th is 01:30 on the 16th.
        let dt = t.to_utc(date, Dublin).unwrap();
        assert_eq!(dt.date_naive(), NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
        assert_eq!(dt.hour(), 1);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn ordering_follows_offsets() {
        let a = ServiceTime::parse("23:59:00").unwrap();
        let b = ServiceTime::parse("24:01:00").unwrap();
        assert!(a < b);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn valid_time()(hour in 0u32..30, minute in 0u32..60, second in 0u32..60) -> String {
            format!("{:02}:{:02}:{:02}", hour, minute, second)
        }
    }

    proptest! {
        /// Any valid HH:MM:SS string parses successfully.
        #[test]
        fn valid_hms_parses(s in valid_time()) {
            prop_assert!(ServiceTime::parse(&s).is_ok());
        }

        /// Parse then display roundtrips.
        #[test]
        fn parse_display_roundtrip(s in valid_time()) {
            let t = ServiceTime::parse(&s).unwrap();
            prop_assert_eq!(t.to_string(), s);
        }

        /// Ordering agrees with the second offset.
        #[test]
        fn ordering_matches_seconds(a in valid_time(), b in valid_time()) {
            let ta = ServiceTime::parse(&a).unwrap();
            let tb = ServiceTime::parse(&b).unwrap();
            prop_assert_eq!(ta.cmp(&tb), ta.seconds().cmp(&tb.seconds()));
        }

        /// Out-of-range minutes are rejected.
        #[test]
        fn invalid_minute_rejected(hour in 0u32..30, minute in 60u32..100) {
            let s = format!("{:02}:{:02}:00", hour, minute);
            prop_assert!(ServiceTime::parse(&s).is_err());
        }

        /// Resolving against a date lands on midnight + offset.
        #[test]
        fn on_date_offset_is_exact(secs in 0u32..(48 * 3600)) {
            let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
            let t = ServiceTime::from_seconds(secs);
            let dt = t.on_service_date(date).unwrap();
            let midnight = date.and_time(NaiveTime::MIN);
            prop_assert_eq!((dt - midnight).num_seconds(), i64::from(secs));
        }
    }
}
