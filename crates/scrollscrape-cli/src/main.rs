// Copyright 2026 Cortex Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod cli;

use cli::args::ScrapeArgs;
use cli::logging::{self, LogOptions};
use cli::output::{self, OutputMode};

#[derive(Parser)]
#[command(
    name = "scrollscrape",
    about = "Scrollscrape: structured records from dynamically rendered pages",
    version,
    after_help = "Run 'scrollscrape <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one page
    Scrape {
        /// Target URL
        url: String,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// Scrape every URL listed in a file, sharing one browser and output
    Batch {
        /// File with one URL per line
        file: PathBuf,
        /// Targets scraped at the same time
        #[arg(long, default_value = "2")]
        concurrency: usize,
        #[command(flatten)]
        args: ScrapeArgs,
    },
    /// List built-in site templates, or show which one a URL uses
    Templates {
        /// URL to match against the templates
        url: Option<String>,
    },
    /// Inspect a SQLite output database
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    /// Check environment and diagnose issues
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum DbAction {
    /// Number of stored records
    Count {
        /// Database file
        db: PathBuf,
    },
    /// Most recently stored records
    Recent {
        /// Database file
        db: PathBuf,
        /// Maximum number of rows
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    output::init(OutputMode {
        json: cli.json,
        quiet: cli.quiet,
    });
    logging::init(&LogOptions {
        level: &cli.log_level,
        verbose: cli.verbose,
        json: cli.log_json,
        dir: cli.log_dir.as_deref(),
    })?;

    let result = match cli.command {
        Commands::Scrape { url, args } => cli::scrape_cmd::run(&url, &args).await,
        Commands::Batch {
            file,
            concurrency,
            args,
        } => cli::batch_cmd::run(&file, concurrency, &args).await,
        Commands::Templates { url } => cli::templates_cmd::run(url.as_deref()),
        Commands::Db { action } => match action {
            DbAction::Count { db } => cli::db_cmd::count(&db),
            DbAction::Recent { db, limit } => cli::db_cmd::recent(&db, limit),
        },
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "scrollscrape", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else if !output::is_quiet() {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
