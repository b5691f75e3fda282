//! Flat tabular file with a fixed column order.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{AppendOutcome, Sink};
use crate::error::SinkError;
use crate::types::{Field, Record};

/// Header row. Field columns follow [`Field::ALL`], then the capture time.
pub const HEADER: [&str; 6] = ["title", "author", "date", "link", "content", "scraped_at"];

/// Appends one row per record. Reopening an existing file keeps its header.
pub struct CsvSink {
    writer: ::csv::Writer<File>,
    path: PathBuf,
}

impl CsvSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        debug!(path = %path.display(), new_file = is_empty, "csv sink opened");

        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        let mut row: Vec<String> = Field::ALL
            .iter()
            .map(|f| record.fields.get(*f).unwrap_or_default().to_string())
            .collect();
        row.push(record.scraped_at().to_rfc3339());
        self.writer.write_record(&row)?;
        Ok(AppendOutcome::Written)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordFields;

    fn rec(title: &str, link: &str) -> Record {
        Record::new(
            link,
            RecordFields {
                title: Some(title.into()),
                link: Some(link.into()),
                content: Some("line one, with comma\nline two".into()),
                ..RecordFields::default()
            },
        )
    }

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&rec("A", "https://a.com/1")).unwrap();
        sink.append(&rec("B", "https://a.com/2")).unwrap();
        sink.flush().unwrap();

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, HEADER);

        let rows: Vec<::csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "A");
        assert_eq!(&rows[0][1], "");
        assert_eq!(&rows[0][3], "https://a.com/1");
        assert_eq!(&rows[1][4], "line one, with comma\nline two");
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.csv");
        {
            let mut sink = CsvSink::open(&path).unwrap();
            sink.append(&rec("A", "https://a.com/1")).unwrap();
            sink.flush().unwrap();
        }
        {
            let mut sink = CsvSink::open(&path).unwrap();
            sink.append(&rec("B", "https://a.com/2")).unwrap();
            sink.flush().unwrap();
        }

        let mut reader = ::csv::Reader::from_path(&path).unwrap();
        let titles: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[0].to_string())
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
    }
}
