//! Renderer abstraction for headless-browser page rendering.
//!
//! A [`Renderer`] hands out one [`RenderContext`] (a tab) per run. The
//! session controller only ever talks to these traits, so tests drive it with
//! a scripted in-memory renderer instead of a real browser.

pub mod chromium;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::SessionState;
use crate::error::BrowserError;
use crate::extractor::DomSnapshot;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// How the page is advanced to reveal more content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScrollMode {
    /// Scroll the window to the bottom to trigger lazy loading.
    #[default]
    InfiniteScroll,
    /// Click the first element matching `next_selector`.
    Paginate { next_selector: String },
}

/// What one scroll action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStep {
    /// Scroll height in pixels, or page index when paginating.
    Moved { position: u64 },
    /// Pagination found no next element.
    NoMore,
}

/// Browser launch options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: Option<String>,
    /// Per-navigation timeout.
    pub nav_timeout_ms: u64,
    /// Explicit browser binary; discovered when absent.
    pub chromium_path: Option<PathBuf>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
            nav_timeout_ms: 30_000,
            chromium_path: None,
        }
    }
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, BrowserError>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<(), BrowserError>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab).
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Install cookies and local storage before the first navigation.
    async fn apply_session_state(&self, state: &SessionState) -> Result<(), BrowserError>;
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult, BrowserError>;
    /// Advance the page once.
    async fn scroll(&self, mode: &ScrollMode) -> Result<ScrollStep, BrowserError>;
    /// Capture the current DOM.
    async fn snapshot(&self) -> Result<DomSnapshot, BrowserError>;
    /// Save a full-page PNG.
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

/// A renderer used when no browser is available. Every context request
/// fails with [`BrowserError::Launch`].
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, BrowserError> {
        Err(BrowserError::Launch("browser not available".into()))
    }
    async fn shutdown(&self) -> Result<(), BrowserError> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_renderer_refuses_contexts() {
        let r = NoopRenderer;
        assert!(matches!(r.new_context().await, Err(BrowserError::Launch(_))));
        assert_eq!(r.active_contexts(), 0);
        r.shutdown().await.unwrap();
    }

    #[test]
    fn test_scroll_mode_serde() {
        let mode: ScrollMode =
            serde_json::from_str(r#"{"kind": "paginate", "next_selector": "a.next"}"#).unwrap();
        assert_eq!(
            mode,
            ScrollMode::Paginate {
                next_selector: "a.next".into()
            }
        );
        let default: ScrollMode = serde_json::from_str(r#"{"kind": "infinite_scroll"}"#).unwrap();
        assert_eq!(default, ScrollMode::InfiniteScroll);
    }
}
