//! Core data types for scraped records and run accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A field a selector rule can resolve inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Author,
    Date,
    Link,
    Content,
}

impl Field {
    /// All fields, in flat-file column order.
    pub const ALL: [Field; 5] = [
        Field::Title,
        Field::Author,
        Field::Date,
        Field::Link,
        Field::Content,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Author => "author",
            Field::Date => "date",
            Field::Link => "link",
            Field::Content => "content",
        }
    }

    /// Whether the refinement stage rewrites this field.
    pub fn is_free_text(self) -> bool {
        matches!(self, Field::Title | Field::Content)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "title" => Ok(Field::Title),
            "author" => Ok(Field::Author),
            "date" => Ok(Field::Date),
            "link" => Ok(Field::Link),
            "content" => Ok(Field::Content),
            other => Err(other.to_string()),
        }
    }
}

/// Extracted text for every field of a record. A field with no match is `None`,
/// never absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub link: Option<String>,
    pub content: Option<String>,
}

impl RecordFields {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Title => self.title.as_deref(),
            Field::Author => self.author.as_deref(),
            Field::Date => self.date.as_deref(),
            Field::Link => self.link.as_deref(),
            Field::Content => self.content.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Author => &mut self.author,
            Field::Date => &mut self.date,
            Field::Link => &mut self.link,
            Field::Content => &mut self.content,
        };
        *slot = value;
    }
}

/// One scraped entity.
///
/// The key and capture time are fixed at construction. Later stages may
/// rewrite field text but cannot touch either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    container_key: String,
    pub fields: RecordFields,
    scraped_at: DateTime<Utc>,
}

impl Record {
    /// Create a record stamped with the current time.
    pub fn new(container_key: impl Into<String>, fields: RecordFields) -> Self {
        Self::captured_at(container_key, fields, Utc::now())
    }

    /// Create a record with an explicit capture time.
    pub fn captured_at(
        container_key: impl Into<String>,
        fields: RecordFields,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            container_key: container_key.into(),
            fields,
            scraped_at,
        }
    }

    pub fn container_key(&self) -> &str {
        &self.container_key
    }

    pub fn scraped_at(&self) -> DateTime<Utc> {
        self.scraped_at
    }

    /// Records without a key cannot be deduplicated and never reach a sink.
    pub fn is_keyed(&self) -> bool {
        !self.container_key.is_empty()
    }
}

/// Outcome of handing a batch of records to the Dedup & Sink stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptResult {
    pub written: usize,
    pub duplicates: usize,
    pub dropped: usize,
    /// Records the sink failed to persist (I/O error mid-run).
    pub failed: usize,
    /// Written records a secondary sink failed to mirror. Already counted
    /// in `written`.
    #[serde(default)]
    pub secondary_failed: usize,
}

impl AcceptResult {
    pub fn merge(&mut self, other: AcceptResult) {
        self.written += other.written;
        self.duplicates += other.duplicates;
        self.dropped += other.dropped;
        self.failed += other.failed;
        self.secondary_failed += other.secondary_failed;
    }

    pub fn total(&self) -> usize {
        self.written + self.duplicates + self.dropped + self.failed
    }
}

/// Why a scroll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// `max_items` records were written.
    MaxItems,
    /// Too many consecutive rounds produced nothing new.
    Stable,
    /// The wall-clock budget ran out.
    Budget,
    /// The caller cancelled the run.
    Cancelled,
    /// The scroll iteration cap was reached.
    MaxScrolls,
    /// Pagination found no further page.
    Exhausted,
    /// Scrolling kept failing after retries; partial results kept.
    ScrollFailed,
    /// Scrolling disabled; one pass over the initial page.
    SinglePass,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationReason::MaxItems => "max items reached",
            TerminationReason::Stable => "no new content",
            TerminationReason::Budget => "time budget exhausted",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::MaxScrolls => "scroll limit reached",
            TerminationReason::Exhausted => "no further pages",
            TerminationReason::ScrollFailed => "scrolling failed",
            TerminationReason::SinglePass => "single pass",
        };
        f.write_str(s)
    }
}

/// Counters and outcome of one run, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub target_url: String,
    pub written: usize,
    pub duplicates: usize,
    pub dropped: usize,
    pub failed_writes: usize,
    /// Written records missing from a secondary output.
    pub secondary_failed: usize,
    pub refined: usize,
    pub refine_failed: usize,
    pub iterations: u32,
    pub termination: TerminationReason,
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// Total records that reached the Dedup & Sink stage.
    pub fn seen(&self) -> usize {
        self.written + self.duplicates + self.dropped + self.failed_writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_roundtrip_names() {
        for field in Field::ALL {
            assert_eq!(field.as_str().parse::<Field>().unwrap(), field);
        }
        assert!("summary".parse::<Field>().is_err());
    }

    #[test]
    fn test_record_fields_get_set() {
        let mut fields = RecordFields::default();
        assert_eq!(fields.get(Field::Title), None);
        fields.set(Field::Title, Some("Hello".into()));
        assert_eq!(fields.get(Field::Title), Some("Hello"));
        assert_eq!(fields.title.as_deref(), Some("Hello"));
    }

    #[test]
    fn test_unkeyed_record() {
        let record = Record::new("", RecordFields::default());
        assert!(!record.is_keyed());
        let record = Record::new("https://a.com/1", RecordFields::default());
        assert!(record.is_keyed());
    }

    #[test]
    fn test_accept_result_merge() {
        let mut total = AcceptResult::default();
        total.merge(AcceptResult {
            written: 2,
            duplicates: 1,
            dropped: 0,
            failed: 0,
            secondary_failed: 2,
        });
        total.merge(AcceptResult {
            written: 1,
            duplicates: 0,
            dropped: 3,
            failed: 1,
            secondary_failed: 0,
        });
        assert_eq!(total.written, 3);
        assert_eq!(total.dropped, 3);
        assert_eq!(total.secondary_failed, 2);
        assert_eq!(total.total(), 8);
    }

    #[test]
    fn test_termination_reason_serializes_snake_case() {
        let json = serde_json::to_string(&TerminationReason::MaxItems).unwrap();
        assert_eq!(json, "\"max_items\"");
    }
}
