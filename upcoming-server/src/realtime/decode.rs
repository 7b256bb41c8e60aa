//! GTFS-Realtime protobuf decode into a [`LiveSnapshot`].

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use gtfs_realtime::FeedMessage;
use prost::Message;
use tracing::debug;

use super::error::FeedError;
use super::snapshot::{LiveSnapshot, LiveUpdate, TripLive, UpdateStatus};

// Wire values of the GTFS-RT ScheduleRelationship enums. Compared raw so an
// unknown future code degrades to the scheduled default instead of failing
// the whole feed.
const STOP_TIME_SKIPPED: i32 = 1;
const STOP_TIME_NO_DATA: i32 = 2;
const TRIP_CANCELED: i32 = 3;

pub fn decode_feed(bytes: &[u8]) -> Result<FeedMessage, FeedError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Flatten a decoded feed into the snapshot the merge engine consumes.
///
/// Only trip updates matter here; vehicle positions and alerts in mixed
/// feeds are ignored. Entities without a trip id cannot be matched against
/// the schedule and are dropped.
pub fn snapshot_from_feed(feed: &FeedMessage, decoded_at: DateTime<Utc>) -> LiveSnapshot {
    let feed_timestamp = feed.header.timestamp.and_then(|t| epoch(t as i64));

    let mut trips: HashMap<String, TripLive> = HashMap::new();
    for entity in &feed.entity {
        let Some(tu) = &entity.trip_update else {
            continue;
        };
        let Some(trip_id) = tu.trip.trip_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(entity = %entity.id, "trip update without trip id, dropping");
            continue;
        };

        let trip = trips.entry(trip_id.to_string()).or_default();
        if tu.trip.schedule_relationship == Some(TRIP_CANCELED) {
            trip.canceled = true;
        }
        if let Some(delay) = tu.delay {
            trip.delay_seconds = Some(delay);
        }

        for stu in &tu.stop_time_update {
            let status = match stu.schedule_relationship {
                Some(STOP_TIME_SKIPPED) => UpdateStatus::Skipped,
                Some(STOP_TIME_NO_DATA) => UpdateStatus::NoData,
                _ => UpdateStatus::Scheduled,
            };
            // Departure drives "when is it due"; arrival stands in when the
            // feed only predicts arrivals.
            let event = stu.departure.as_ref().or(stu.arrival.as_ref());
            trip.updates.push(LiveUpdate {
                trip_id: trip_id.to_string(),
                stop_id: stu.stop_id.clone().filter(|s| !s.is_empty()),
                stop_sequence: stu.stop_sequence,
                status,
                predicted: event.and_then(|e| e.time).and_then(epoch),
                delay_seconds: event.and_then(|e| e.delay),
            });
        }
    }

    LiveSnapshot::new(feed_timestamp, Some(decoded_at), trips)
}

fn epoch(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
