//! The session controller: one target, one browser context, one scroll loop.
//!
//! A run goes through these steps:
//!
//! 1. Load the session artifact if the auth mode asks for one. A required
//!    artifact that is missing or corrupt fails the run here, before any
//!    browser context exists.
//! 2. Open a context, install the session state, navigate with retry. A
//!    navigation that still fails is fatal. A state the browser refuses is
//!    fatal only in required mode.
//! 3. Loop: check stop conditions, scroll (except on the first pass), pause,
//!    snapshot, extract, refine, accept. Errors inside an iteration are
//!    logged and counted; they never abort the run.
//! 4. Close the context, whatever happened above.
//!
//! A round is *stable* when it writes nothing new. The loop stops once
//! `stable_rounds` consecutive stable rounds have been seen.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::SessionState;
use crate::clock::{Clock, SystemClock};
use crate::config::ScrapeConfig;
use crate::dedup::Collector;
use crate::error::{AuthError, ScrapeError, ScrapeResult};
use crate::events::{EventBus, ScrapeEvent};
use crate::extractor::Extractor;
use crate::refine::{RefineOutcome, Refinement};
use crate::renderer::{RenderContext, Renderer, ScrollStep};
use crate::retry::{RetryError, RetryPolicy};
use crate::selectors::SelectorRuleSet;
use crate::sink::SharedSink;
use crate::types::{AcceptResult, RunSummary, TerminationReason};

/// Per-run loop bookkeeping. Owned by the controller for one run only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollState {
    /// Passes over the page so far, the initial one included.
    pub iteration: u32,
    /// Scroll actions performed.
    pub scrolls: u32,
    /// Records written so far.
    pub items_seen_count: usize,
    /// Consecutive passes that wrote nothing.
    pub stable_rounds: u32,
    /// Last scroll height or page index.
    pub position: Option<u64>,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AcceptResult,
    refined: usize,
    refine_failed: usize,
    iteration_errors: usize,
}

/// Drives one target from navigation to termination.
pub struct SessionController {
    config: ScrapeConfig,
    renderer: Arc<dyn Renderer>,
    extractor: Extractor,
    refinement: Refinement,
    sink: SharedSink,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl SessionController {
    pub fn new(
        config: ScrapeConfig,
        renderer: Arc<dyn Renderer>,
        rules: SelectorRuleSet,
        sink: SharedSink,
        refinement: Refinement,
    ) -> Self {
        let extractor =
            Extractor::new(rules, config.key.clone()).with_detection(config.container_detection);
        Self {
            config,
            renderer,
            extractor,
            refinement,
            sink,
            clock: Arc::new(SystemClock::new()),
            events: EventBus::default(),
        }
    }

    /// Build the sink and refinement stage from `config`.
    ///
    /// Fails if the configuration is invalid or the sink cannot be opened.
    pub fn from_config(
        config: ScrapeConfig,
        renderer: Arc<dyn Renderer>,
        rules: SelectorRuleSet,
    ) -> ScrapeResult<Self> {
        config.validate()?;
        let sink = config.output.open()?;
        let refinement = config.refinement()?;
        Ok(Self::new(
            config,
            renderer,
            rules,
            Arc::new(tokio::sync::Mutex::new(sink)),
            refinement,
        ))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn sink(&self) -> SharedSink {
        Arc::clone(&self.sink)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Scrape `target_url` until a stop condition holds.
    ///
    /// Only fatal failures are returned as errors; everything else ends up
    /// in the summary counters.
    pub async fn run(
        &self,
        target_url: &str,
        cancel: &CancellationToken,
    ) -> ScrapeResult<RunSummary> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started = self.clock.elapsed();

        let result = self.run_inner(&run_id, target_url, cancel, started).await;
        match &result {
            Ok(summary) => {
                info!(
                    url = target_url,
                    written = summary.written,
                    duplicates = summary.duplicates,
                    dropped = summary.dropped,
                    reason = %summary.termination,
                    elapsed_ms = summary.elapsed_ms,
                    "run finished"
                );
                self.events.emit(ScrapeEvent::RunFinished {
                    run_id: run_id.clone(),
                    termination: summary.termination,
                    summary: summary.clone(),
                });
            }
            Err(e) => {
                error!(url = target_url, error = %e, "run failed");
                self.events.emit(ScrapeEvent::RunFailed {
                    run_id: run_id.clone(),
                    target_url: target_url.to_string(),
                    error: e.to_string(),
                });
            }
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: &str,
        target_url: &str,
        cancel: &CancellationToken,
        started: Duration,
    ) -> ScrapeResult<RunSummary> {
        let session_state = self.config.auth.resolve()?;

        let ctx = self.renderer.new_context().await?;
        let outcome = self
            .drive(ctx.as_ref(), run_id, target_url, session_state, cancel, started)
            .await;
        if let Err(e) = ctx.close().await {
            warn!(url = target_url, error = %e, "failed to close browser context");
        }
        outcome
    }

    async fn drive(
        &self,
        ctx: &dyn RenderContext,
        run_id: &str,
        target_url: &str,
        session_state: Option<SessionState>,
        cancel: &CancellationToken,
        started: Duration,
    ) -> ScrapeResult<RunSummary> {
        if let Some(state) = &session_state {
            match ctx.apply_session_state(state).await {
                Ok(()) => {}
                Err(e) if self.config.auth.is_required() => {
                    return Err(AuthError::Rejected(e.to_string()).into());
                }
                Err(e) => {
                    warn!(error = %e, "browser rejected session state, continuing without it");
                }
            }
        }

        let policy = self.config.retry_policy();
        let clock = self.clock.as_ref();
        let nav_timeout = self.config.browser.nav_timeout_ms;
        let nav = policy
            .run(clock, "navigate", move |_| ctx.navigate(target_url, nav_timeout))
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: target_url.to_string(),
                source: e.into_inner(),
            })?;
        info!(url = target_url, final_url = %nav.final_url, load_ms = nav.load_time_ms, "page loaded");
        self.events.emit(ScrapeEvent::RunStarted {
            run_id: run_id.to_string(),
            target_url: target_url.to_string(),
        });

        if let Some(path) = &self.config.screenshot {
            match ctx.screenshot(path).await {
                Ok(()) => info!(path = %path.display(), "screenshot saved"),
                Err(e) => warn!(path = %path.display(), error = %e, "screenshot failed"),
            }
        }

        let mut collector = Collector::new(self.sink());
        let mut state = ScrollState::default();
        let mut counters = Counters::default();

        let termination = loop {
            if let Some(reason) = self.stop_reason(&state, cancel, started) {
                break reason;
            }

            if state.iteration > 0 {
                match self.advance(ctx, &policy, &mut state).await {
                    Ok(()) => {}
                    Err(reason) => break reason,
                }
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = clock.sleep(self.config.scroll_pause()) => {}
                }
            }
            state.iteration += 1;

            let written = self
                .collect_pass(ctx, &policy, run_id, &state, &mut collector, &mut counters, cancel, started)
                .await;
            state.items_seen_count += written;
            if written == 0 {
                state.stable_rounds += 1;
            } else {
                state.stable_rounds = 0;
            }
            debug!(
                iteration = state.iteration,
                written,
                stable_rounds = state.stable_rounds,
                position = ?state.position,
                "iteration complete"
            );
            self.events.emit(ScrapeEvent::IterationCompleted {
                run_id: run_id.to_string(),
                iteration: state.iteration,
                position: state.position,
                extracted: written,
                stable_rounds: state.stable_rounds,
            });
        };

        if counters.iteration_errors > 0 {
            warn!(errors = counters.iteration_errors, "iterations failed during run");
        }

        let elapsed = self.clock.elapsed().saturating_sub(started);
        Ok(RunSummary {
            run_id: run_id.to_string(),
            target_url: target_url.to_string(),
            written: counters.accepted.written,
            duplicates: counters.accepted.duplicates,
            dropped: counters.accepted.dropped,
            failed_writes: counters.accepted.failed,
            secondary_failed: counters.accepted.secondary_failed,
            refined: counters.refined,
            refine_failed: counters.refine_failed,
            iterations: state.iteration,
            termination,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Checked at the top of every iteration.
    fn stop_reason(
        &self,
        state: &ScrollState,
        cancel: &CancellationToken,
        started: Duration,
    ) -> Option<TerminationReason> {
        let scroll = &self.config.scroll;
        if cancel.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        if self
            .config
            .max_items
            .is_some_and(|max| state.items_seen_count >= max)
        {
            return Some(TerminationReason::MaxItems);
        }
        if state.iteration > 0 && !scroll.enabled {
            return Some(TerminationReason::SinglePass);
        }
        if state.stable_rounds >= scroll.stable_rounds {
            return Some(TerminationReason::Stable);
        }
        if self.budget_exhausted(started) {
            return Some(TerminationReason::Budget);
        }
        if state.scrolls >= scroll.max_scrolls && state.iteration > 0 {
            return Some(TerminationReason::MaxScrolls);
        }
        None
    }

    fn budget_exhausted(&self, started: Duration) -> bool {
        self.config
            .budget()
            .is_some_and(|budget| self.clock.elapsed().saturating_sub(started) >= budget)
    }

    /// One scroll action, retried. Returns the reason to stop if the page
    /// cannot be advanced.
    async fn advance(
        &self,
        ctx: &dyn RenderContext,
        policy: &RetryPolicy,
        state: &mut ScrollState,
    ) -> Result<(), TerminationReason> {
        let mode = &self.config.scroll.mode;
        match policy
            .run(self.clock.as_ref(), "scroll", move |_| ctx.scroll(mode))
            .await
        {
            Ok(ScrollStep::Moved { position }) => {
                state.scrolls += 1;
                state.position = Some(position);
                Ok(())
            }
            Ok(ScrollStep::NoMore) => {
                info!(iteration = state.iteration, "no further page");
                Err(TerminationReason::Exhausted)
            }
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(attempts, error = %last, "scrolling failed, keeping partial results");
                Err(TerminationReason::ScrollFailed)
            }
            Err(RetryError::Permanent(e)) => {
                warn!(error = %e, "scrolling failed, keeping partial results");
                Err(TerminationReason::ScrollFailed)
            }
        }
    }

    /// Snapshot, extract, refine and accept. Returns records written.
    #[allow(clippy::too_many_arguments)]
    async fn collect_pass(
        &self,
        ctx: &dyn RenderContext,
        policy: &RetryPolicy,
        run_id: &str,
        state: &ScrollState,
        collector: &mut Collector,
        counters: &mut Counters,
        cancel: &CancellationToken,
        started: Duration,
    ) -> usize {
        let snapshot = match policy
            .run(self.clock.as_ref(), "snapshot", move |_| ctx.snapshot())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(iteration = state.iteration, error = %e, "snapshot failed, skipping iteration");
                counters.iteration_errors += 1;
                return 0;
            }
        };

        let extraction = self.extractor.extract(&snapshot);
        let mut records = extraction.records;
        let remaining = self
            .config
            .max_items
            .map(|max| max.saturating_sub(state.items_seen_count));

        // Only records that can still be written are worth refining.
        let mut pending: HashSet<String> = HashSet::new();
        for record in records.iter_mut() {
            let key = record.container_key();
            if key.is_empty() || collector.is_known(key) || pending.contains(key) {
                continue;
            }
            if remaining.is_some_and(|r| pending.len() >= r) {
                break;
            }
            if cancel.is_cancelled() || self.budget_exhausted(started) {
                debug!("stopping refinement early");
                break;
            }
            pending.insert(key.to_string());

            match self
                .refinement
                .refine_record(record, self.clock.as_ref())
                .await
            {
                RefineOutcome::Refined => counters.refined += 1,
                RefineOutcome::Unchanged => {}
                RefineOutcome::Failed(e) => {
                    counters.refine_failed += 1;
                    self.events.emit(ScrapeEvent::RefinementFailed {
                        run_id: run_id.to_string(),
                        key: record.container_key().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let result = collector.accept_up_to(records, remaining).await;
        counters.accepted.merge(result);
        self.events.emit(ScrapeEvent::RecordsAccepted {
            run_id: run_id.to_string(),
            written: result.written,
            duplicates: result.duplicates,
            dropped: result.dropped,
            total_written: counters.accepted.written,
        });
        result.written
    }
}
