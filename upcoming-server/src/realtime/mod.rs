//! Live GTFS-Realtime data: fetching, decoding and the published snapshot.
//!
//! A background poller fetches the provider's trip-update feed on a fixed
//! interval, decodes it and publishes a complete [`LiveSnapshot`] behind
//! [`SharedLive`]. Every failure leaves the previous snapshot in place, so
//! query serving never observes a partial feed.

mod decode;
mod error;
mod fetch;
mod snapshot;

pub use decode::{decode_feed, snapshot_from_feed};
pub use error::FeedError;
pub use fetch::{FeedSource, FeedStatus, Provider, SharedFeedStatus, run_poller};
pub use snapshot::{LiveSnapshot, LiveUpdate, SharedLive, TripLive, UpdateStatus};
