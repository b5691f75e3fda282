//! SQLite sink with a unique link column.
//!
//! The `link` column stores the record's container key, so the table's
//! unique constraint agrees with the in-memory dedup set. A conflicting
//! insert is ignored and reported as [`AppendOutcome::Conflict`].

use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

use super::{AppendOutcome, Sink};
use crate::error::SinkError;
use crate::types::Record;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS scraped_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT,
    author TEXT,
    date TEXT,
    link TEXT UNIQUE,
    content TEXT,
    scraped_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);";

/// A row read back for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRow {
    pub id: i64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub date: Option<String>,
    pub link: String,
    pub content: Option<String>,
    pub scraped_at: String,
}

pub struct SqliteSink {
    db: Connection,
}

impl SqliteSink {
    /// Open or create the database and its table.
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)?;
        db.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "sqlite sink opened");
        Ok(Self { db })
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self { db })
    }

    /// Total stored rows.
    pub fn count(&self) -> Result<u64, SinkError> {
        let n: i64 = self
            .db
            .query_row("SELECT COUNT(*) FROM scraped_data", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    /// The `limit` most recently inserted rows, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredRow>, SinkError> {
        let mut stmt = self.db.prepare(
            "SELECT id, title, author, date, link, content, scraped_at
             FROM scraped_data ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredRow {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    author: row.get(2)?,
                    date: row.get(3)?,
                    link: row.get(4)?,
                    content: row.get(5)?,
                    scraped_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether a row with this key exists.
    pub fn contains(&self, key: &str) -> Result<bool, SinkError> {
        let result = self.db.query_row(
            "SELECT 1 FROM scraped_data WHERE link = ?1",
            params![key],
            |_| Ok(()),
        );
        match result {
            Ok(()) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

impl Sink for SqliteSink {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        let f = &record.fields;
        let inserted = self.db.execute(
            "INSERT OR IGNORE INTO scraped_data (title, author, date, link, content, scraped_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                f.title,
                f.author,
                f.date,
                record.container_key(),
                f.content,
                record.scraped_at().to_rfc3339(),
            ],
        )?;
        Ok(if inserted == 0 {
            AppendOutcome::Conflict
        } else {
            AppendOutcome::Written
        })
    }
}
