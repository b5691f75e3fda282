//! The Dedup & Sink stage.
//!
//! [`Collector`] owns the run's dedup set and forwards new records to the
//! shared sink. Per-record problems are classified, never raised: an
//! unkeyed record is dropped, a known key is a duplicate, and a sink write
//! error is counted as failed.

use std::collections::HashSet;
use tracing::{debug, warn};

use crate::sink::{AppendOutcome, SharedSink};
use crate::types::{AcceptResult, Record};

/// Keys emitted during one run. Grows monotonically.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    keys: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&mut self, key: &str) -> bool {
        self.keys.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Deduplicates records and appends the survivors to a sink.
pub struct Collector {
    seen: DedupSet,
    sink: SharedSink,
}

impl Collector {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            seen: DedupSet::new(),
            sink,
        }
    }

    /// Whether `key` was already accepted in this run.
    pub fn is_known(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    pub fn seen(&self) -> &DedupSet {
        &self.seen
    }

    /// Accept a batch with no write limit.
    pub async fn accept(&mut self, records: Vec<Record>) -> AcceptResult {
        self.accept_up_to(records, None).await
    }

    /// Accept a batch, stopping once `limit` records have been written.
    /// Records after the limit is hit are left unclassified.
    ///
    /// The sink lock is held for the whole batch so a batch is appended
    /// contiguously even when several runs share the sink.
    pub async fn accept_up_to(&mut self, records: Vec<Record>, limit: Option<usize>) -> AcceptResult {
        let mut result = AcceptResult::default();
        if limit == Some(0) {
            return result;
        }

        let mut sink = self.sink.lock().await;
        for record in records {
            let key = record.container_key();
            if key.is_empty() {
                result.dropped += 1;
                continue;
            }
            if self.seen.contains(key) {
                result.duplicates += 1;
                continue;
            }

            match sink.append(&record) {
                Ok(AppendOutcome::Written) => {
                    self.seen.insert(key);
                    result.written += 1;
                }
                Ok(AppendOutcome::Conflict) => {
                    self.seen.insert(key);
                    result.duplicates += 1;
                }
                Err(e) => {
                    warn!(key, sink = sink.name(), error = %e, "sink write failed");
                    result.failed += 1;
                }
            }

            if limit.is_some_and(|l| result.written >= l) {
                break;
            }
        }

        if let Err(e) = sink.flush() {
            warn!(sink = sink.name(), error = %e, "sink flush failed");
        }
        result.secondary_failed = sink.take_secondary_failures();
        if result.secondary_failed > 0 {
            warn!(
                missing = result.secondary_failed,
                "written records missing from a secondary sink"
            );
        }
        if result.dropped > 0 {
            warn!(dropped = result.dropped, "dropped records without a key");
        }
        debug!(
            written = result.written,
            duplicates = result.duplicates,
            dropped = result.dropped,
            failed = result.failed,
            secondary_failed = result.secondary_failed,
            "batch accepted"
        );
        result
    }
}
