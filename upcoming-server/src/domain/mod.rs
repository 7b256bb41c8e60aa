//! Domain types for the upcoming-departures server.
//!
//! This module contains the validated primitives shared between the schedule
//! loader and the merge engine. All types enforce their invariants at
//! construction time, so code that receives them can trust their validity.

mod route_type;
mod time;

pub use route_type::RouteType;
pub use time::{ServiceTime, TimeError};
