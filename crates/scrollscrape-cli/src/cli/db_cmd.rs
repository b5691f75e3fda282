//! `scrollscrape db`: inspect a SQLite output database.

use anyhow::{bail, Context, Result};
use std::path::Path;

use scrollscrape::sink::SqliteSink;

use crate::cli::output;

fn open(path: &Path) -> Result<SqliteSink> {
    if !path.exists() {
        bail!("no database at {}", path.display());
    }
    SqliteSink::open(path).with_context(|| format!("failed to open {}", path.display()))
}

pub fn count(path: &Path) -> Result<()> {
    let total = open(path)?.count()?;
    if output::is_json() {
        output::print_json(&serde_json::json!({ "database": path, "records": total }));
    } else {
        println!("{total}");
    }
    Ok(())
}

pub fn recent(path: &Path, limit: usize) -> Result<()> {
    let rows = open(path)?.recent(limit)?;
    if output::is_json() {
        output::print_json(&serde_json::to_value(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        if !output::is_quiet() {
            eprintln!("  No records stored yet.");
        }
        return Ok(());
    }
    for row in rows {
        println!(
            "  [{}] {}  {}",
            row.scraped_at,
            row.title.as_deref().unwrap_or("(untitled)"),
            row.link
        );
    }
    Ok(())
}
