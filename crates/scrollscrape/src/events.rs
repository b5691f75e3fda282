// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Progress events from running sessions.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`ScrapeEvent`] values. The CLI progress display, a log writer or a batch
//! supervisor can subscribe independently. When no subscribers exist, events
//! are silently dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{RunSummary, TerminationReason};

/// Every event a session emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScrapeEvent {
    /// Navigation to the target succeeded and the loop is about to start.
    RunStarted { run_id: String, target_url: String },
    /// One pass of scroll, snapshot and extract finished.
    IterationCompleted {
        run_id: String,
        iteration: u32,
        position: Option<u64>,
        extracted: usize,
        stable_rounds: u32,
    },
    /// A batch went through Dedup & Sink.
    RecordsAccepted {
        run_id: String,
        written: usize,
        duplicates: usize,
        dropped: usize,
        total_written: usize,
    },
    /// A record kept its original text because refinement failed.
    RefinementFailed {
        run_id: String,
        key: String,
        error: String,
    },
    /// The loop stopped and the context was released.
    RunFinished {
        run_id: String,
        termination: TerminationReason,
        summary: RunSummary,
    },
    /// The run aborted with a fatal error.
    RunFailed {
        run_id: String,
        target_url: String,
        error: String,
    },
}

impl ScrapeEvent {
    pub fn run_id(&self) -> &str {
        match self {
            ScrapeEvent::RunStarted { run_id, .. }
            | ScrapeEvent::IterationCompleted { run_id, .. }
            | ScrapeEvent::RecordsAccepted { run_id, .. }
            | ScrapeEvent::RefinementFailed { run_id, .. }
            | ScrapeEvent::RunFinished { run_id, .. }
            | ScrapeEvent::RunFailed { run_id, .. } => run_id,
        }
    }

    /// Whether this is the last event of its run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScrapeEvent::RunFinished { .. } | ScrapeEvent::RunFailed { .. }
        )
    }
}

/// Broadcast bus shared by every session of a process.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ScrapeEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: ScrapeEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ScrapeEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
