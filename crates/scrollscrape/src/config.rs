//! Run configuration.
//!
//! [`ScrapeConfig`] is the single explicit value handed to the session
//! controller. Optional capabilities (sink targets, refinement backend) are
//! turned into trait objects here, once, so the pipeline never checks
//! whether a feature is enabled.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthMode;
use crate::error::{ScrapeError, ScrapeResult, SinkError};
use crate::extractor::ContainerDetection;
use crate::normalize::KeyNormalization;
use crate::refine::{openai, HttpRefiner, OpenAiRefiner, RefineMode, Refinement, Refiner};
use crate::renderer::{BrowserOptions, ScrollMode};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::sink::{self, FileFormat, Sink};

/// Environment variable holding the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub enabled: bool,
    pub mode: ScrollMode,
    /// Fixed wait after each scroll action.
    pub pause_ms: u64,
    /// Consecutive rounds without a new write before the loop stops.
    pub stable_rounds: u32,
    pub max_scrolls: u32,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: ScrollMode::InfiniteScroll,
            pause_ms: 1000,
            stable_rounds: 3,
            max_scrolls: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RefineBackend {
    #[default]
    Disabled,
    Http {
        endpoint: String,
    },
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_model")]
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default)]
        mode: RefineMode,
        /// Override for proxies and tests.
        #[serde(default)]
        base_url: Option<String>,
    },
}

fn default_model() -> String {
    openai::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f64 {
    openai::DEFAULT_TEMPERATURE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub backend: RefineBackend,
    pub timeout_ms: u64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            backend: RefineBackend::Disabled,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutput {
    pub path: PathBuf,
    #[serde(default)]
    pub format: FileFormat,
}

impl FileOutput {
    /// Output file with the format guessed from its extension.
    pub fn guess(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = FileFormat::from_path(&path);
        Self { path, format }
    }
}

/// Where accepted records go. Both absent means a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub file: Option<FileOutput>,
    pub database: Option<PathBuf>,
}

impl OutputConfig {
    pub fn open(&self) -> Result<Box<dyn Sink>, SinkError> {
        sink::open(
            self.file.as_ref().map(|f| (f.path.as_path(), f.format)),
            self.database.as_deref(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Stop after this many records were written. `None` is unbounded.
    pub max_items: Option<usize>,
    pub scroll: ScrollConfig,
    /// Wall-clock budget for the whole run.
    pub budget_ms: Option<u64>,
    pub browser: BrowserOptions,
    pub auth: AuthMode,
    pub retry: RetryConfig,
    pub refine: RefineConfig,
    pub output: OutputConfig,
    pub key: KeyNormalization,
    /// Container match-count range used by rule sets that detect their
    /// container.
    pub container_detection: ContainerDetection,
    /// Full-page screenshot after the initial load.
    pub screenshot: Option<PathBuf>,
}

impl ScrapeConfig {
    /// Load a JSON config file. Missing keys take their defaults.
    pub fn from_path(path: &Path) -> ScrapeResult<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| ScrapeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: ScrapeConfig = serde_json::from_str(&data)
            .map_err(|e| ScrapeError::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScrapeResult<()> {
        if self.max_items == Some(0) {
            return Err(ScrapeError::Config("max_items must be at least 1".into()));
        }
        if self.scroll.stable_rounds == 0 {
            return Err(ScrapeError::Config("stable_rounds must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ScrapeError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ScrapeError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        let detection = &self.container_detection;
        if detection.min == 0 || detection.min > detection.max {
            return Err(ScrapeError::Config(
                "container_detection needs 1 <= min <= max".into(),
            ));
        }
        if let ScrollMode::Paginate { next_selector } = &self.scroll.mode {
            scraper::Selector::parse(next_selector).map_err(|e| {
                ScrapeError::Config(format!("invalid next_selector {next_selector:?}: {e:?}"))
            })?;
        }
        if let RefineBackend::Http { endpoint } = &self.refine.backend {
            url::Url::parse(endpoint)
                .map_err(|e| ScrapeError::Config(format!("invalid refine endpoint: {e}")))?;
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll.pause_ms)
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget_ms.map(Duration::from_millis)
    }

    /// Build the refinement stage, reading the API key from the environment
    /// when the OpenAI backend is selected.
    pub fn refinement(&self) -> ScrapeResult<Refinement> {
        self.refinement_with_key(std::env::var(OPENAI_API_KEY_ENV).ok())
    }

    pub fn refinement_with_key(&self, api_key: Option<String>) -> ScrapeResult<Refinement> {
        let timeout = Duration::from_millis(self.refine.timeout_ms);
        let refiner: Arc<dyn Refiner> = match &self.refine.backend {
            RefineBackend::Disabled => return Ok(Refinement::disabled()),
            RefineBackend::Http { endpoint } => Arc::new(HttpRefiner::new(endpoint.clone(), timeout)),
            RefineBackend::OpenAi {
                model,
                temperature,
                mode,
                base_url,
            } => {
                let key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                    ScrapeError::Config(format!(
                        "the openai refiner needs {OPENAI_API_KEY_ENV} to be set"
                    ))
                })?;
                let mut refiner = OpenAiRefiner::new(key, timeout)
                    .with_model(model.clone())
                    .with_temperature(*temperature)
                    .with_mode(*mode);
                if let Some(url) = base_url {
                    refiner = refiner.with_base_url(url.clone());
                }
                Arc::new(refiner)
            }
        };
        Ok(Refinement::new(refiner, self.retry_policy(), timeout))
    }
}
