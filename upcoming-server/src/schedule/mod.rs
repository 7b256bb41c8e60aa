//! Static GTFS schedule: record parsing, chunked loading and the queryable
//! in-memory index.
//!
//! The loader reads the flat GTFS reference tables from a directory, parses
//! them in parallel chunks and builds a read-only [`ScheduleIndex`]. The index
//! is never mutated after construction; a reload builds a fresh index and
//! swaps it in behind [`SharedSchedule`].

mod error;
mod index;
mod loader;
mod records;

pub use error::{LoadError, MalformedRow};
pub use index::{Departure, ScheduleIndex, ScheduleTables, SharedSchedule};
pub use loader::{ChunkRunner, LoaderConfig, SerialRunner, ThreadedRunner, WorkerModel, load_schedule};
pub use records::{
    Agency, Calendar, CalendarDate, Columns, Exception, Record, Route, Stop, StopTime, Trip,
};
