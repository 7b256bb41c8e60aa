//! Schedule load error types.

use std::fmt;

/// A row that could not be parsed into a typed record.
///
/// Recoverable: the loader logs and skips these unless strict mode is on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{table} line {line}: {reason}")]
pub struct MalformedRow {
    /// Table file name, e.g. `stop_times.txt`.
    pub table: &'static str,
    /// 1-based line number in the file (the header is line 1).
    pub line: u64,
    pub reason: String,
}

impl MalformedRow {
    pub fn new(table: &'static str, line: u64, reason: impl Into<String>) -> Self {
        Self {
            table,
            line,
            reason: reason.into(),
        }
    }
}

/// A fatal schedule-load failure. The service must not start (or must keep
/// serving its previous index, on reload) when one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A required table file could not be opened or read.
    #[error("cannot read {table}: {source}")]
    Io {
        table: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Strict mode: the table contained malformed rows.
    #[error("{table}: {count} malformed rows, first: {}", FirstRows(.first))]
    BadRows {
        table: &'static str,
        count: usize,
        /// The first few offending rows, for the error report.
        first: Vec<MalformedRow>,
    },
}

struct FirstRows<'a>(&'a [MalformedRow]);

impl fmt::Display for FirstRows<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{row}")?;
        }
        Ok(())
    }
}
