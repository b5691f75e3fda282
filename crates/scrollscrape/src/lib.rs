// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

//! Scrollscrape library: structured records from dynamically rendered pages.
//!
//! A [`SessionController`] drives one headless-browser context through a
//! scroll loop, extracts records with a [`SelectorRuleSet`], optionally
//! refines their text, and hands them to a deduplicating sink.

pub mod auth;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod events;
pub mod extractor;
pub mod normalize;
pub mod refine;
pub mod renderer;
pub mod retry;
pub mod runner;
pub mod selectors;
pub mod session;
pub mod sink;
pub mod types;

pub use config::ScrapeConfig;
pub use error::{ScrapeError, ScrapeResult};
pub use selectors::SelectorRuleSet;
pub use session::SessionController;
pub use types::{Record, RunSummary, TerminationReason};
