//! Chromium-based renderer using chromiumoxide.

use super::{BrowserOptions, NavigationResult, RenderContext, Renderer, ScrollMode, ScrollStep};
use crate::auth::{SessionState, StoredCookie};
use crate::error::BrowserError;
use crate::extractor::DomSnapshot;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, CookieSameSite, SetCookiesParams, TimeSinceEpoch,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Environment variable naming the browser binary.
pub const CHROMIUM_PATH_ENV: &str = "SCROLLSCRAPE_CHROMIUM_PATH";

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. SCROLLSCRAPE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var(CHROMIUM_PATH_ENV) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.scrollscrape/chromium/
    if let Some(home) = dirs::home_dir() {
        let base = home.join(".scrollscrape").join("chromium");
        let candidates = if cfg!(target_os = "macos") {
            vec![
                base.join("chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                base.join("chrome"),
            ]
        } else {
            vec![base.join("chrome-linux64/chrome"), base.join("chrome")]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

fn cdp_error(e: CdpError) -> BrowserError {
    match e {
        CdpError::Timeout => BrowserError::Timeout(0),
        CdpError::Ws(e) => BrowserError::Network(e.to_string()),
        CdpError::JavascriptException(e) => BrowserError::Script(format!("{e:?}")),
        other => {
            let msg = other.to_string();
            if msg.contains("net::ERR_") {
                BrowserError::Network(msg)
            } else {
                BrowserError::Protocol(msg)
            }
        }
    }
}

fn cookie_param(c: &StoredCookie) -> CookieParam {
    let mut param = CookieParam::new(c.name.clone(), c.value.clone());
    param.domain = Some(c.domain.clone());
    param.path = Some(c.path.clone());
    param.secure = Some(c.secure);
    param.http_only = Some(c.http_only);
    if c.expires > 0.0 {
        param.expires = Some(TimeSinceEpoch::new(c.expires));
    }
    param.same_site = match c.same_site.as_deref() {
        Some("Strict") => Some(CookieSameSite::Strict),
        Some("Lax") => Some(CookieSameSite::Lax),
        Some("None") => Some(CookieSameSite::None),
        _ => None,
    };
    param
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance with `options`.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, BrowserError> {
        let chrome_path = options
            .chromium_path
            .clone()
            .or_else(find_chromium)
            .ok_or_else(|| {
                BrowserError::Launch(format!(
                    "Chromium not found; install it or set {CHROMIUM_PATH_ENV}"
                ))
            })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .window_size(options.viewport_width, options.viewport_height)
            .viewport(Viewport {
                width: options.viewport_width,
                height: options.viewport_height,
                ..Viewport::default()
            })
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking");
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        if let Some(ua) = &options.user_agent {
            builder = builder.arg(format!("--user-agent={ua}"));
        }
        let config = builder
            .build()
            .map_err(|e| BrowserError::Launch(format!("failed to build browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!(path = %chrome_path.display(), headless = options.headless, "chromium launched");
        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(cdp_error)?;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            active_count: Arc::clone(&self.active_count),
            page_index: AtomicU64::new(0),
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    active_count: Arc<AtomicUsize>,
    page_index: AtomicU64,
}

impl ChromiumContext {
    async fn eval<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T, BrowserError> {
        self.page
            .evaluate(script)
            .await
            .map_err(cdp_error)?
            .into_value()
            .map_err(|e| BrowserError::Script(format!("failed to convert JS result: {e:?}")))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn apply_session_state(&self, state: &SessionState) -> Result<(), BrowserError> {
        if !state.cookies.is_empty() {
            let cookies: Vec<CookieParam> = state.cookies.iter().map(cookie_param).collect();
            self.page
                .execute(SetCookiesParams::new(cookies))
                .await
                .map_err(cdp_error)?;
        }
        if let Some(script) = state.local_storage_script() {
            self.page
                .evaluate_on_new_document(script)
                .await
                .map_err(cdp_error)?;
        }
        debug!(cookies = state.cookies.len(), "session state installed");
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult, BrowserError> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());
                self.page_index.store(0, Ordering::Relaxed);

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => Err(cdp_error(e)),
            Err(_) => Err(BrowserError::Timeout(timeout_ms)),
        }
    }

    async fn scroll(&self, mode: &ScrollMode) -> Result<ScrollStep, BrowserError> {
        match mode {
            ScrollMode::InfiniteScroll => {
                let height: f64 = self
                    .eval(
                        "(() => { window.scrollTo(0, document.body.scrollHeight); \
                         return document.body.scrollHeight; })()",
                    )
                    .await?;
                Ok(ScrollStep::Moved {
                    position: height.max(0.0) as u64,
                })
            }
            ScrollMode::Paginate { next_selector } => {
                let selector = serde_json::to_string(next_selector)
                    .map_err(|e| BrowserError::Script(e.to_string()))?;
                let clicked: bool = self
                    .eval(&format!(
                        "(() => {{ const el = document.querySelector({selector}); \
                         if (!el) return false; el.click(); return true; }})()"
                    ))
                    .await?;
                if !clicked {
                    return Ok(ScrollStep::NoMore);
                }
                let index = self.page_index.fetch_add(1, Ordering::Relaxed) + 1;
                Ok(ScrollStep::Moved { position: index })
            }
        }
    }

    async fn snapshot(&self) -> Result<DomSnapshot, BrowserError> {
        let html: String = self.eval("document.documentElement.outerHTML").await?;
        let url = self
            .page
            .url()
            .await
            .map_err(cdp_error)?
            .unwrap_or_default();
        Ok(DomSnapshot::new(html, &url))
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| BrowserError::Protocol(format!("cannot create {}: {e}", parent.display())))?;
        }
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        let _ = self.page.close().await;
        Ok(())
    }
}
