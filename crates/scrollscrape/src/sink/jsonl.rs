//! JSON Lines sink: one object per record, append-only.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{AppendOutcome, Sink};
use crate::error::SinkError;
use crate::types::{Record, RecordFields};

#[derive(Serialize)]
struct Line<'a> {
    key: &'a str,
    #[serde(flatten)]
    fields: &'a RecordFields,
    scraped_at: String,
}

pub struct JsonlSink {
    out: BufWriter<File>,
    path: PathBuf,
}

impl JsonlSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        let line = Line {
            key: record.container_key(),
            fields: &record.fields,
            scraped_at: record.scraped_at().to_rfc3339(),
        };
        let json = serde_json::to_string(&line)?;
        writeln!(self.out, "{json}")?;
        Ok(AppendOutcome::Written)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}
