//! `scrollscrape batch <file>`: many targets over one browser and one sink.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use scrollscrape::events::EventBus;
use scrollscrape::renderer::chromium::ChromiumRenderer;
use scrollscrape::renderer::Renderer;
use scrollscrape::runner;
use scrollscrape::{ScrapeError, SessionController};

use crate::cli::args::ScrapeArgs;
use crate::cli::progress::Progress;
use crate::cli::{cancel_on_ctrl_c, output};

/// Target URLs from a file: one per line, `#` starts a comment.
pub fn read_targets(path: &Path) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read targets {}", path.display()))?;
    Ok(parse_targets(&data))
}

fn parse_targets(data: &str) -> Vec<String> {
    data.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn run(file: &Path, concurrency: usize, args: &ScrapeArgs) -> Result<()> {
    let targets = read_targets(file)?;
    if targets.is_empty() {
        bail!("no targets in {}", file.display());
    }
    let config = args.load_config()?;

    let sink = Arc::new(Mutex::new(
        config.output.open().context("failed to open output")?,
    ));
    let refinement = config.refinement()?;

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::launch(&config.browser)
            .await
            .context("failed to launch Chromium (run `scrollscrape doctor`)")?,
    );

    let events = EventBus::default();
    let cancel = cancel_on_ctrl_c();
    let progress = Progress::start(&events, targets.len());

    let results = runner::run_all(&targets, concurrency, &cancel, |url| {
        let rules = args
            .rules_for(url)
            .map_err(|e| ScrapeError::Config(format!("{e:#}")))?;
        Ok(SessionController::new(
            config.clone(),
            Arc::clone(&renderer),
            rules,
            Arc::clone(&sink),
            refinement.clone(),
        )
        .with_events(events.clone()))
    })
    .await;

    if let Some(progress) = progress {
        progress.finish();
    }
    if let Err(e) = renderer.shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }

    let mut summaries = Vec::new();
    let mut failures = Vec::new();
    for (url, result) in targets.iter().zip(results) {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => failures.push((url.clone(), e.to_string())),
        }
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "runs": summaries,
            "failed": failures
                .iter()
                .map(|(url, error)| serde_json::json!({"target_url": url, "error": error}))
                .collect::<Vec<_>>(),
        }));
    } else {
        for summary in &summaries {
            output::print_summary(summary);
        }
        for (url, error) in &failures {
            eprintln!("  [!!] {url}: {error}");
        }
        if !output::is_quiet() {
            let written: usize = summaries.iter().map(|s| s.written).sum();
            println!();
            println!(
                "  {} of {} targets succeeded, {written} records written",
                summaries.len(),
                targets.len()
            );
        }
    }

    if summaries.is_empty() {
        bail!("every target failed");
    }
    Ok(())
}
