//! GTFS route types.

use serde::Serialize;
use std::fmt;

/// The mode of transport of a route.
///
/// Values follow the GTFS `route_type` code table
/// (<https://developers.google.com/transit/gtfs/reference>).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteType {
    Tram,
    Subway,
    Rail,
    Bus,
    Ferry,
    CableTram,
    AerialLift,
    Funicular,
    Trolleybus,
    Monorail,
}

impl RouteType {
    /// Map a GTFS `route_type` code to a RouteType. Unknown codes (including
    /// the extended European code set) return `None`.
    pub fn from_gtfs_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(RouteType::Tram),
            "1" => Some(RouteType::Subway),
            "2" => Some(RouteType::Rail),
            "3" => Some(RouteType::Bus),
            "4" => Some(RouteType::Ferry),
            "5" => Some(RouteType::CableTram),
            "6" => Some(RouteType::AerialLift),
            "7" => Some(RouteType::Funicular),
            "11" => Some(RouteType::Trolleybus),
            "12" => Some(RouteType::Monorail),
            _ => None,
        }
    }

    /// The wire name used in served JSON, e.g. `BUS`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Tram => "TRAM",
            RouteType::Subway => "SUBWAY",
            RouteType::Rail => "RAIL",
            RouteType::Bus => "BUS",
            RouteType::Ferry => "FERRY",
            RouteType::CableTram => "CABLE_TRAM",
            RouteType::AerialLift => "AERIAL_LIFT",
            RouteType::Funicular => "FUNICULAR",
            RouteType::Trolleybus => "TROLLEYBUS",
            RouteType::Monorail => "MONORAIL",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
