//! Subscriber setup. The library only emits; this is the one place that
//! decides where logs go.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Keeps the file writer flushing until exit.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type Filtered = Layered<EnvFilter, Registry>;

pub struct LogOptions<'a> {
    pub level: &'a str,
    pub verbose: bool,
    pub json: bool,
    pub dir: Option<&'a Path>,
}

/// Install the global subscriber. `RUST_LOG` wins over `--log-level`;
/// `--verbose` forces `debug`.
pub fn init(opts: &LogOptions<'_>) -> Result<()> {
    let default_level = if opts.verbose { "debug" } else { opts.level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console: Box<dyn Layer<Filtered> + Send + Sync> = if opts.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match opts.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("scrollscrape")
                .filename_suffix("log")
                .max_log_files(14)
                .build(dir)
                .context("failed to open log file")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = GUARD.set(guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}
