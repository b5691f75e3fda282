//! Concurrent scraping of several independent targets.
//!
//! Each target gets its own controller, and so its own browser context,
//! scroll state and dedup set. The controllers normally share one
//! [`SharedSink`](crate::sink::SharedSink), whose lock serializes writes.

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ScrapeResult;
use crate::session::SessionController;
use crate::types::RunSummary;

/// Scrape `targets` with at most `concurrency` runs in flight.
///
/// `make` builds the controller for one target URL. Results come back in
/// input order, one per target; a failed target never affects the others.
pub async fn run_all<F>(
    targets: &[String],
    concurrency: usize,
    cancel: &CancellationToken,
    make: F,
) -> Vec<ScrapeResult<RunSummary>>
where
    F: Fn(&str) -> ScrapeResult<SessionController>,
{
    info!(targets = targets.len(), concurrency, "batch started");
    let make = &make;

    let results: Vec<ScrapeResult<RunSummary>> = stream::iter(targets.iter())
        .map(|url| async move {
            match make(url) {
                Ok(controller) => controller.run(url, cancel).await,
                Err(e) => {
                    warn!(url = url.as_str(), error = %e, "could not set up target");
                    Err(e)
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(targets = targets.len(), failed, "batch finished");
    results
}
