//! Chunked, parallel loading of GTFS reference tables.
//!
//! Each table file is read once, split into contiguous chunks of data rows,
//! and parsed by a pool of workers. Workers never share mutable state: each
//! returns an independent partial result, and a single-threaded merge step
//! concatenates them in chunk order, so the outcome is identical for every
//! chunk size and worker count.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::thread;

use tracing::{debug, warn};

use super::error::{LoadError, MalformedRow};
use super::index::{ScheduleIndex, ScheduleTables};
use super::records::{
    Agency, Calendar, CalendarDate, Columns, Record, Route, Stop, StopTime, Trip,
};

/// How many offending rows a strict-mode failure (or best-effort warning)
/// reports individually.
const BAD_ROW_REPORT_LIMIT: usize = 3;

/// The operator-selectable worker strategy for the parse phase.
///
/// A pass-through configuration, not auto-tuned: on small single-board hosts
/// the dispatch overhead of the thread pool can outweigh its benefit, and
/// operators pick the model that measures best on their hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerModel {
    /// Parse every chunk on the calling thread.
    Serial,
    /// Parse chunks on a fixed pool of OS threads.
    Threaded,
}

impl FromStr for WorkerModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "serial" => Ok(WorkerModel::Serial),
            "threaded" => Ok(WorkerModel::Threaded),
            other => Err(format!("unknown worker model {other:?} (serial, threaded)")),
        }
    }
}

/// Loader tunables.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Worker count for the threaded model.
    pub workers: usize,

    /// Rows per unit of work. Smaller chunks with more workers trade
    /// dispatch overhead for load balancing.
    pub chunk_rows: usize,

    pub worker_model: WorkerModel,

    /// Escalate any malformed row to a fatal [`LoadError::BadRows`].
    pub strict: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            chunk_rows: 100_000,
            worker_model: WorkerModel::Threaded,
            strict: false,
        }
    }
}

/// One contiguous run of data rows handed to a worker.
///
/// GTFS exports do not put newlines inside quoted fields, so chunking on
/// line boundaries is safe.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    text: &'a str,
    /// 1-based file line of the chunk's first row (the header is line 1).
    first_line: u64,
}

/// A worker's independent partial result for one chunk.
pub struct ChunkOutput<T> {
    records: Vec<T>,
    bad: Vec<MalformedRow>,
    discarded: usize,
}

/// The "parallel map over chunks" seam behind [`WorkerModel`].
pub trait ChunkRunner {
    /// Apply `parse` to every chunk, returning outputs in chunk order.
    fn run<'a, T, F>(&self, chunks: Vec<Chunk<'a>>, parse: F) -> Vec<ChunkOutput<T>>
    where
        T: Send,
        F: Fn(Chunk<'a>) -> ChunkOutput<T> + Sync;
}

/// Parses chunks one after another on the calling thread.
pub struct SerialRunner;

impl ChunkRunner for SerialRunner {
    fn run<'a, T, F>(&self, chunks: Vec<Chunk<'a>>, parse: F) -> Vec<ChunkOutput<T>>
    where
        T: Send,
        F: Fn(Chunk<'a>) -> ChunkOutput<T> + Sync,
    {
        chunks.into_iter().map(parse).collect()
    }
}

/// Distributes chunks round-robin over a fixed pool of scoped threads.
pub struct ThreadedRunner {
    pub workers: usize,
}

impl ChunkRunner for ThreadedRunner {
    fn run<'a, T, F>(&self, chunks: Vec<Chunk<'a>>, parse: F) -> Vec<ChunkOutput<T>>
    where
        T: Send,
        F: Fn(Chunk<'a>) -> ChunkOutput<T> + Sync,
    {
        let n = chunks.len();
        if n == 0 {
            return Vec::new();
        }
        let workers = self.workers.clamp(1, n);

        let mut slots: Vec<Option<ChunkOutput<T>>> = (0..n).map(|_| None).collect();
        thread::scope(|scope| {
            let parse = &parse;
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let mine: Vec<(usize, Chunk<'a>)> = chunks
                        .iter()
                        .copied()
                        .enumerate()
                        .skip(w)
                        .step_by(workers)
                        .collect();
                    scope.spawn(move || {
                        mine.into_iter()
                            .map(|(i, chunk)| (i, parse(chunk)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(outputs) => {
                        for (i, out) in outputs {
                            slots[i] = Some(out);
                        }
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.expect("every chunk produces exactly one output"))
            .collect()
    }
}

/// Load the full static schedule from a GTFS directory.
///
/// Tables are loaded in dependency order; when `keep_stops` is set, stop
/// times outside the allowlist are discarded inside the parse workers and
/// the index build drops the trips and stops left unreachable. Required
/// tables that cannot be read are fatal.
pub fn load_schedule(
    dir: &Path,
    config: &LoaderConfig,
    keep_stops: Option<&HashSet<String>>,
) -> Result<ScheduleIndex, LoadError> {
    let agencies: Vec<Agency> = load_optional_table(dir, config)?;
    let routes: Vec<Route> = load_table(dir, config, None)?;
    let stops: Vec<Stop> = load_table(dir, config, None)?;
    let calendars: Vec<Calendar> = load_table(dir, config, None)?;
    let exceptions: Vec<CalendarDate> = load_optional_table(dir, config)?;
    let trips: Vec<Trip> = load_table(dir, config, None)?;

    let keep = keep_stops.map(|allow| move |st: &StopTime| allow.contains(&st.stop_id));
    let keep_ref: Option<&(dyn Fn(&StopTime) -> bool + Sync)> =
        keep.as_ref().map(|f| f as &(dyn Fn(&StopTime) -> bool + Sync));
    let stop_times: Vec<StopTime> = load_table(dir, config, keep_ref)?;

    Ok(ScheduleIndex::build(
        ScheduleTables {
            agencies,
            routes,
            stops,
            calendars,
            exceptions,
            trips,
            stop_times,
        },
        keep_stops.is_some(),
    ))
}

/// Load one required table. An unreadable file is fatal.
fn load_table<T: Record>(
    dir: &Path,
    config: &LoaderConfig,
    keep: Option<&(dyn Fn(&T) -> bool + Sync)>,
) -> Result<Vec<T>, LoadError> {
    let raw = fs::read_to_string(dir.join(T::TABLE)).map_err(|source| LoadError::Io {
        table: T::TABLE,
        source,
    })?;
    parse_table(&raw, config, keep)
}

/// Load one optional table; a missing file yields an empty collection.
fn load_optional_table<T: Record>(dir: &Path, config: &LoaderConfig) -> Result<Vec<T>, LoadError> {
    match fs::read_to_string(dir.join(T::TABLE)) {
        Ok(raw) => parse_table(&raw, config, None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(table = T::TABLE, "optional table absent");
            Ok(Vec::new())
        }
        Err(source) => Err(LoadError::Io {
            table: T::TABLE,
            source,
        }),
    }
}

fn parse_table<T: Record>(
    raw: &str,
    config: &LoaderConfig,
    keep: Option<&(dyn Fn(&T) -> bool + Sync)>,
) -> Result<Vec<T>, LoadError> {
    // Some NTA data files have a single unprintable character upfront, which
    // would otherwise end up in the first header name.
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    let (header_line, body) = raw.split_once('\n').unwrap_or((raw, ""));
    let cols = parse_header(header_line);
    let chunks = split_chunks(body, config.chunk_rows.max(1));

    let parse_chunk = |chunk: Chunk<'_>| -> ChunkOutput<T> {
        let mut out = ChunkOutput {
            records: Vec::new(),
            bad: Vec::new(),
            discarded: 0,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(chunk.text.as_bytes());
        for (i, result) in rdr.records().enumerate() {
            let line = chunk.first_line + i as u64;
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    out.bad.push(MalformedRow::new(T::TABLE, line, e.to_string()));
                    continue;
                }
            };
            match T::parse(&cols, &row, line) {
                Ok(record) => {
                    if keep.is_none_or(|keep| keep(&record)) {
                        out.records.push(record);
                    } else {
                        out.discarded += 1;
                    }
                }
                Err(bad) => out.bad.push(bad),
            }
        }
        out
    };

    let outputs = match config.worker_model {
        WorkerModel::Serial => SerialRunner.run(chunks, parse_chunk),
        WorkerModel::Threaded => ThreadedRunner {
            workers: config.workers,
        }
        .run(chunks, parse_chunk),
    };

    // Single-threaded merge of the independent partial results.
    let mut records = Vec::new();
    let mut bad = Vec::new();
    let mut discarded = 0usize;
    for mut out in outputs {
        records.append(&mut out.records);
        bad.append(&mut out.bad);
        discarded += out.discarded;
    }

    if !bad.is_empty() {
        if config.strict {
            let count = bad.len();
            bad.truncate(BAD_ROW_REPORT_LIMIT);
            return Err(LoadError::BadRows {
                table: T::TABLE,
                count,
                first: bad,
            });
        }
        for row in bad.iter().take(BAD_ROW_REPORT_LIMIT) {
            warn!(%row, "skipping malformed row");
        }
        warn!(table = T::TABLE, count = bad.len(), "skipped malformed rows");
    }

    debug!(
        table = T::TABLE,
        loaded = records.len(),
        discarded,
        "table loaded"
    );
    Ok(records)
}

fn parse_header(line: &str) -> Columns {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());
    let mut record = csv::StringRecord::new();
    match rdr.read_record(&mut record) {
        Ok(true) => Columns::from_header(&record),
        _ => Columns::from_header(&csv::StringRecord::new()),
    }
}

fn split_chunks(body: &str, chunk_rows: usize) -> Vec<Chunk<'_>> {
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut rows_in_chunk = 0usize;
    let mut first_line = 2u64; // data rows start after the header
    let mut next_line = 2u64;

    for (i, b) in body.bytes().enumerate() {
        if b == b'\n' {
            rows_in_chunk += 1;
            next_line += 1;
            if rows_in_chunk == chunk_rows {
                chunks.push(Chunk {
                    text: &body[start..=i],
                    first_line,
                });
                start = i + 1;
                first_line = next_line;
                rows_in_chunk = 0;
            }
        }
    }
    if start < body.len() {
        chunks.push(Chunk {
            text: &body[start..],
            first_line,
        });
    }
    chunks
}
