//! Spinner fed from the session event bus.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use scrollscrape::events::{EventBus, ScrapeEvent};

use crate::cli::output;

pub struct Progress {
    bar: ProgressBar,
    task: JoinHandle<()>,
}

impl Progress {
    /// Start rendering events from `events`. `None` in JSON or quiet mode.
    pub fn start(events: &EventBus, runs: usize) -> Option<Self> {
        if output::is_json() || output::is_quiet() {
            return None;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("  {spinner} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("starting browser");

        let mut rx = events.subscribe();
        let display = bar.clone();
        let task = tokio::spawn(async move {
            let mut finished = 0usize;
            let mut written = 0usize;
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                match event {
                    ScrapeEvent::RunStarted { target_url, .. } => {
                        display.set_message(format!("loaded {target_url}"));
                    }
                    ScrapeEvent::RecordsAccepted { written: n, .. } => {
                        written += n;
                    }
                    ScrapeEvent::IterationCompleted {
                        iteration,
                        stable_rounds,
                        ..
                    } => {
                        display.set_message(format!(
                            "iteration {iteration}: {written} written, {stable_rounds} stable"
                        ));
                    }
                    ScrapeEvent::RefinementFailed { key, .. } => {
                        display.println(format!("  refinement failed for {key}"));
                    }
                    ScrapeEvent::RunFinished { .. } | ScrapeEvent::RunFailed { .. } => {
                        finished += 1;
                        if runs > 1 {
                            display.set_message(format!("{finished}/{runs} targets done"));
                        }
                    }
                }
            }
        });

        Some(Self { bar, task })
    }

    pub fn finish(self) {
        self.task.abort();
        self.bar.finish_and_clear();
    }
}
