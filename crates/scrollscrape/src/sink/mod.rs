//! Persistence targets behind one append interface.
//!
//! Sinks are append-only: a written record is never rewritten or reordered.
//! A sink that enforces uniqueness itself (the SQLite sink) reports a
//! conflicting insert as [`AppendOutcome::Conflict`], which the Dedup & Sink
//! stage counts as a duplicate.

pub mod csv;
pub mod jsonl;
pub mod sqlite;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::SinkError;
use crate::types::Record;

pub use self::csv::CsvSink;
pub use self::jsonl::JsonlSink;
pub use self::sqlite::SqliteSink;

/// Result of appending one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// The sink already holds a record with this key.
    Conflict,
}

/// An append-only record store.
pub trait Sink: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError>;

    /// Push buffered rows to durable storage.
    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Written records a mirror failed to store since the last call.
    /// Only sinks that fan out report any.
    fn take_secondary_failures(&mut self) -> usize {
        0
    }
}

/// Single-writer handle shared by concurrent runs.
pub type SharedSink = Arc<Mutex<Box<dyn Sink>>>;

/// Wrap a sink for sharing.
pub fn shared(sink: impl Sink + 'static) -> SharedSink {
    Arc::new(Mutex::new(Box::new(sink)))
}

/// Discards everything. Used for dry runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    fn append(&mut self, _record: &Record) -> Result<AppendOutcome, SinkError> {
        Ok(AppendOutcome::Written)
    }
}

/// Writes to a primary sink and mirrors written records to secondaries.
///
/// The primary decides the outcome. A secondary that fails is logged and
/// counted; it never turns a primary write into a failure.
pub struct FanoutSink {
    primary: Box<dyn Sink>,
    secondaries: Vec<Box<dyn Sink>>,
    secondary_failed: usize,
}

impl FanoutSink {
    pub fn new(primary: Box<dyn Sink>) -> Self {
        Self {
            primary,
            secondaries: Vec::new(),
            secondary_failed: 0,
        }
    }

    pub fn with_secondary(mut self, sink: Box<dyn Sink>) -> Self {
        self.secondaries.push(sink);
        self
    }
}

impl Sink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        let outcome = self.primary.append(record)?;
        if outcome == AppendOutcome::Written {
            for sink in &mut self.secondaries {
                if let Err(e) = sink.append(record) {
                    warn!(sink = sink.name(), key = record.container_key(), error = %e, "secondary sink write failed");
                    self.secondary_failed += 1;
                }
            }
        }
        Ok(outcome)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for sink in &mut self.secondaries {
            if let Err(e) = sink.flush() {
                warn!(sink = sink.name(), error = %e, "secondary sink flush failed");
            }
        }
        self.primary.flush()
    }

    fn take_secondary_failures(&mut self) -> usize {
        std::mem::take(&mut self.secondary_failed)
    }
}

/// Flat-file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    #[default]
    Csv,
    Jsonl,
}

impl FileFormat {
    /// Guess from the file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("jsonl" | "ndjson" | "json") => FileFormat::Jsonl,
            _ => FileFormat::Csv,
        }
    }
}

/// Open the configured sinks. The database, when present, is the primary so
/// its unique column decides duplicates; the file mirrors what it accepts.
///
/// Fails with [`SinkError`] if any target cannot be opened; this happens
/// before a browser is launched.
pub fn open(
    file: Option<(&Path, FileFormat)>,
    database: Option<&Path>,
) -> Result<Box<dyn Sink>, SinkError> {
    let file_sink: Option<Box<dyn Sink>> = match file {
        Some((path, FileFormat::Csv)) => Some(Box::new(CsvSink::open(path)?)),
        Some((path, FileFormat::Jsonl)) => Some(Box::new(JsonlSink::open(path)?)),
        None => None,
    };
    let db_sink: Option<Box<dyn Sink>> = match database {
        Some(path) => Some(Box::new(SqliteSink::open(path)?)),
        None => None,
    };

    let sink: Box<dyn Sink> = match (db_sink, file_sink) {
        (Some(db), Some(file)) => Box::new(FanoutSink::new(db).with_secondary(file)),
        (Some(db), None) => db,
        (None, Some(file)) => file,
        (None, None) => Box::new(NullSink),
    };
    info!(sink = sink.name(), "sink opened");
    Ok(sink)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory sink that records what it was given.
    #[derive(Default)]
    pub struct MemorySink {
        pub keys: Vec<String>,
        pub fail_on: Option<String>,
        pub unique: bool,
    }

    impl Sink for MemorySink {
        fn name(&self) -> &str {
            "memory"
        }

        fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
            if self.fail_on.as_deref() == Some(record.container_key()) {
                return Err(SinkError::Unavailable("disk full".into()));
            }
            if self.unique && self.keys.iter().any(|k| k == record.container_key()) {
                return Ok(AppendOutcome::Conflict);
            }
            self.keys.push(record.container_key().to_string());
            Ok(AppendOutcome::Written)
        }
    }
}
