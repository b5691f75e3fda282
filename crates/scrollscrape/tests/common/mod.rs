//! Scripted in-memory renderer and recording sink for driving the session
//! controller without a browser.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scrollscrape::auth::SessionState;
use scrollscrape::error::{BrowserError, SinkError};
use scrollscrape::extractor::DomSnapshot;
use scrollscrape::renderer::{NavigationResult, RenderContext, Renderer, ScrollMode, ScrollStep};
use scrollscrape::sink::{AppendOutcome, Sink};
use scrollscrape::types::Record;

pub const BASE: &str = "https://feed.example/";

/// Build a page with one `<article>` per link. An empty link gives an
/// article without an anchor.
pub fn feed(links: &[&str]) -> String {
    let mut html = String::from("<html><body>");
    for (i, link) in links.iter().enumerate() {
        html.push_str(&format!("<article><h2>Item {i} {link}</h2><p>body {i}</p>"));
        if !link.is_empty() {
            html.push_str(&format!("<a href=\"{link}\">more</a>"));
        }
        html.push_str("</article>");
    }
    html.push_str("</body></html>");
    html
}

/// Page states revealed one per scroll: page `n` holds items `1..=per_page*(n+1)`.
pub fn growing_pages(pages: usize, per_page: usize) -> Vec<String> {
    (0..pages)
        .map(|n| {
            let links: Vec<String> = (1..=per_page * (n + 1)).map(|i| format!("/posts/{i}")).collect();
            let refs: Vec<&str> = links.iter().map(String::as_str).collect();
            feed(&refs)
        })
        .collect()
}

#[derive(Default)]
pub struct Script {
    /// DOM states; scrolling moves to the next one, sticking at the last.
    pub pages: Vec<String>,
    /// Every navigation fails with this error.
    pub nav_error: Option<BrowserError>,
    /// Navigation to these URLs fails with a script error.
    pub fail_urls: Vec<String>,
    /// Every scroll fails with this error.
    pub scroll_error: Option<BrowserError>,
    /// Snapshot calls with these 1-based indices fail with a script error.
    pub failing_snapshots: Vec<usize>,
    /// Installing a session state fails.
    pub reject_session: bool,
}

#[derive(Default)]
pub struct Stats {
    pub contexts: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: AtomicUsize,
    pub scrolls: AtomicUsize,
    pub snapshots: AtomicUsize,
    pub sessions_applied: AtomicUsize,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

pub struct FakeRenderer {
    script: Arc<Script>,
    pub stats: Arc<Stats>,
}

impl FakeRenderer {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            stats: Arc::new(Stats::default()),
        })
    }

    pub fn pages(pages: Vec<String>) -> Arc<Self> {
        Self::new(Script {
            pages,
            ..Script::default()
        })
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, BrowserError> {
        self.stats.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            index: AtomicUsize::new(0),
            url: Mutex::new(String::from(BASE)),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        Stats::get(&self.stats.contexts) - Stats::get(&self.stats.closed)
    }
}

struct FakeContext {
    script: Arc<Script>,
    stats: Arc<Stats>,
    index: AtomicUsize,
    url: Mutex<String>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn apply_session_state(&self, _state: &SessionState) -> Result<(), BrowserError> {
        if self.script.reject_session {
            return Err(BrowserError::Protocol("invalid cookie".into()));
        }
        self.stats.sessions_applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult, BrowserError> {
        self.stats.navigations.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.script.nav_error {
            return Err(match e {
                BrowserError::Timeout(_) => BrowserError::Timeout(timeout_ms),
                other => other.clone(),
            });
        }
        if self.script.fail_urls.iter().any(|u| u == url) {
            return Err(BrowserError::Script("net::ERR_ABORTED".into()));
        }
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 5,
        })
    }

    async fn scroll(&self, mode: &ScrollMode) -> Result<ScrollStep, BrowserError> {
        self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = &self.script.scroll_error {
            return Err(e.clone());
        }
        let last = self.script.pages.len().saturating_sub(1);
        let current = self.index.load(Ordering::SeqCst);
        match mode {
            ScrollMode::Paginate { .. } if current >= last => Ok(ScrollStep::NoMore),
            ScrollMode::Paginate { .. } => {
                self.index.store(current + 1, Ordering::SeqCst);
                Ok(ScrollStep::Moved {
                    position: (current + 1) as u64,
                })
            }
            ScrollMode::InfiniteScroll => {
                let next = (current + 1).min(last);
                self.index.store(next, Ordering::SeqCst);
                Ok(ScrollStep::Moved {
                    position: (next as u64 + 1) * 1000,
                })
            }
        }
    }

    async fn snapshot(&self) -> Result<DomSnapshot, BrowserError> {
        let n = self.stats.snapshots.fetch_add(1, Ordering::SeqCst) + 1;
        if self.script.failing_snapshots.contains(&n) {
            return Err(BrowserError::Script("document is gone".into()));
        }
        let index = self.index.load(Ordering::SeqCst);
        let html = self.script.pages.get(index).cloned().unwrap_or_default();
        let url = self.url.lock().map(|u| u.clone()).unwrap_or_default();
        Ok(DomSnapshot::new(html, &url))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        std::fs::write(path, b"png").map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sink that keeps appended records for inspection.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub records: Arc<Mutex<Vec<Record>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.container_key().to_string())
            .collect()
    }
}

impl Sink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn append(&mut self, record: &Record) -> Result<AppendOutcome, SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Unavailable("poisoned".into()))?
            .push(record.clone());
        Ok(AppendOutcome::Written)
    }
}
