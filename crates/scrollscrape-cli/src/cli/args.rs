//! Flags shared by `scrape` and `batch`, layered over an optional config file.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use scrollscrape::auth::{resolve_state_path, AuthMode};
use scrollscrape::config::{FileOutput, RefineBackend};
use scrollscrape::refine::{openai, RefineMode};
use scrollscrape::renderer::ScrollMode;
use scrollscrape::selectors::templates;
use scrollscrape::sink::FileFormat;
use scrollscrape::{ScrapeConfig, SelectorRuleSet};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Jsonl,
}

impl From<FormatArg> for FileFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Csv => FileFormat::Csv,
            FormatArg::Jsonl => FileFormat::Jsonl,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AuthArg {
    Disabled,
    Optional,
    Required,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RefineArg {
    Disabled,
    Http,
    Openai,
}

#[derive(Debug, Clone, Default, Args)]
pub struct ScrapeArgs {
    /// JSON config file; flags below override its values
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Selector rule set file (JSON); overrides site templates
    #[arg(long)]
    pub selectors: Option<PathBuf>,

    /// Ignore built-in site templates and use the generic rules
    #[arg(long)]
    pub no_template: bool,

    /// Stop after this many records were written
    #[arg(long)]
    pub max_items: Option<usize>,

    /// Extract the initial page only
    #[arg(long)]
    pub no_scroll: bool,

    /// Click this selector to page instead of scrolling
    #[arg(long, value_name = "SELECTOR")]
    pub paginate: Option<String>,

    /// Pause after each scroll, in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,

    /// Consecutive rounds without new records before stopping
    #[arg(long)]
    pub stable_rounds: Option<u32>,

    /// Upper bound on scroll actions
    #[arg(long)]
    pub max_scrolls: Option<u32>,

    /// Wall-clock budget in seconds
    #[arg(long)]
    pub budget: Option<u64>,

    /// Write records to this file
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// File format (default: from the file extension)
    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Also write records to this SQLite database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Session artifact handling
    #[arg(long, value_enum)]
    pub auth: Option<AuthArg>,

    /// Session artifact path (implies --auth required unless --auth is given)
    #[arg(long)]
    pub storage_state: Option<PathBuf>,

    /// Text refinement backend
    #[arg(long, value_enum)]
    pub refine: Option<RefineArg>,

    /// Endpoint for --refine http
    #[arg(long)]
    pub refine_endpoint: Option<String>,

    /// Model for --refine openai
    #[arg(long)]
    pub model: Option<String>,

    /// Summarize content to at most this many words (--refine openai)
    #[arg(long, value_name = "WORDS")]
    pub summarize: Option<u32>,

    /// Replace content with this many key points (--refine openai)
    #[arg(long, value_name = "COUNT", conflicts_with = "summarize")]
    pub key_points: Option<u32>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Chromium executable
    #[arg(long)]
    pub chromium: Option<PathBuf>,

    /// Override the browser user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Navigation timeout in milliseconds
    #[arg(long)]
    pub nav_timeout_ms: Option<u64>,

    /// Save a full-page screenshot after the initial load
    #[arg(long)]
    pub screenshot: Option<PathBuf>,
}

impl ScrapeArgs {
    /// Config file (or defaults) with flag overrides applied, validated.
    pub fn load_config(&self) -> Result<ScrapeConfig> {
        let mut config = match &self.config {
            Some(path) => ScrapeConfig::from_path(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ScrapeConfig::default(),
        };

        if let Some(n) = self.max_items {
            config.max_items = Some(n);
        }
        if self.no_scroll {
            config.scroll.enabled = false;
        }
        if let Some(selector) = &self.paginate {
            config.scroll.mode = ScrollMode::Paginate {
                next_selector: selector.clone(),
            };
        }
        if let Some(ms) = self.pause_ms {
            config.scroll.pause_ms = ms;
        }
        if let Some(n) = self.stable_rounds {
            config.scroll.stable_rounds = n;
        }
        if let Some(n) = self.max_scrolls {
            config.scroll.max_scrolls = n;
        }
        if let Some(secs) = self.budget {
            config.budget_ms = Some(secs.saturating_mul(1000));
        }

        if let Some(path) = &self.output {
            config.output.file = Some(match self.format {
                Some(format) => FileOutput {
                    path: path.clone(),
                    format: format.into(),
                },
                None => FileOutput::guess(path.clone()),
            });
        }
        if let Some(path) = &self.db {
            config.output.database = Some(path.clone());
        }

        self.apply_auth(&mut config);
        self.apply_refine(&mut config)?;

        if self.headful {
            config.browser.headless = false;
        }
        if let Some(path) = &self.chromium {
            config.browser.chromium_path = Some(path.clone());
        }
        if let Some(ua) = &self.user_agent {
            config.browser.user_agent = Some(ua.clone());
        }
        if let Some(ms) = self.nav_timeout_ms {
            config.browser.nav_timeout_ms = ms;
        }
        if let Some(path) = &self.screenshot {
            config.screenshot = Some(path.clone());
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_auth(&self, config: &mut ScrapeConfig) {
        let mode = match (self.auth, &self.storage_state) {
            (Some(mode), _) => mode,
            (None, Some(_)) => AuthArg::Required,
            (None, None) => return,
        };
        let path = resolve_state_path(self.storage_state.as_deref());
        config.auth = match mode {
            AuthArg::Disabled => AuthMode::Disabled,
            AuthArg::Optional => AuthMode::Optional { path },
            AuthArg::Required => AuthMode::Required { path },
        };
    }

    fn apply_refine(&self, config: &mut ScrapeConfig) -> Result<()> {
        match self.refine {
            None => {}
            Some(RefineArg::Disabled) => config.refine.backend = RefineBackend::Disabled,
            Some(RefineArg::Http) => {
                let Some(endpoint) = self.refine_endpoint.clone() else {
                    bail!("--refine http needs --refine-endpoint");
                };
                config.refine.backend = RefineBackend::Http { endpoint };
            }
            Some(RefineArg::Openai) => {
                config.refine.backend = RefineBackend::OpenAi {
                    model: openai::DEFAULT_MODEL.to_string(),
                    temperature: openai::DEFAULT_TEMPERATURE,
                    mode: RefineMode::Clean,
                    base_url: None,
                };
            }
        }

        if let RefineBackend::OpenAi { model, mode, .. } = &mut config.refine.backend {
            if let Some(m) = &self.model {
                *model = m.clone();
            }
            if let Some(max_words) = self.summarize {
                *mode = RefineMode::Summarize { max_words };
            }
            if let Some(count) = self.key_points {
                *mode = RefineMode::KeyPoints { count };
            }
        }
        Ok(())
    }

    /// Rule set for `url`: the `--selectors` file, else its site template,
    /// else the generic rules.
    pub fn rules_for(&self, url: &str) -> Result<SelectorRuleSet> {
        let rules = match &self.selectors {
            Some(path) => SelectorRuleSet::from_path(path)
                .with_context(|| format!("failed to load selectors {}", path.display()))?,
            None if self.no_template => SelectorRuleSet::generic()?,
            None => templates::for_url(url)?,
        };
        Ok(rules)
    }
}
