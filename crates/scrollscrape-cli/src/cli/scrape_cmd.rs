//! `scrollscrape scrape <url>`: one target, one run.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use scrollscrape::events::EventBus;
use scrollscrape::renderer::chromium::ChromiumRenderer;
use scrollscrape::renderer::Renderer;
use scrollscrape::{SessionController, TerminationReason};

use crate::cli::args::ScrapeArgs;
use crate::cli::progress::Progress;
use crate::cli::{cancel_on_ctrl_c, output};

pub async fn run(url: &str, args: &ScrapeArgs) -> Result<()> {
    let config = args.load_config()?;
    let rules = args.rules_for(url)?;

    // Open every output before the browser starts.
    let sink = config.output.open().context("failed to open output")?;
    let refinement = config.refinement()?;

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::launch(&config.browser)
            .await
            .context("failed to launch Chromium (run `scrollscrape doctor`)")?,
    );

    let events = EventBus::default();
    let controller = SessionController::new(
        config,
        Arc::clone(&renderer),
        rules,
        Arc::new(Mutex::new(sink)),
        refinement,
    )
    .with_events(events.clone());

    let cancel = cancel_on_ctrl_c();
    let progress = Progress::start(&events, 1);
    let result = controller.run(url, &cancel).await;
    if let Some(progress) = progress {
        progress.finish();
    }
    if let Err(e) = renderer.shutdown().await {
        warn!(error = %e, "browser shutdown failed");
    }

    let summary = result.with_context(|| format!("scrape of {url} failed"))?;
    output::print_summary(&summary);
    if summary.termination == TerminationReason::Cancelled && !output::is_quiet() {
        eprintln!("  Interrupted; records written so far were kept.");
    }
    Ok(())
}
