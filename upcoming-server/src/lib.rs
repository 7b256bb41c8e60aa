//! Upcoming transit departures server.
//!
//! Loads a static GTFS schedule, polls a GTFS-Realtime trip-update feed,
//! and serves the reconciled "what's due at my stop" list over HTTP.

pub mod config;
pub mod domain;
pub mod merge;
pub mod realtime;
pub mod schedule;
pub mod web;
