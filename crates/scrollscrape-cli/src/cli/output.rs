//! Output mode shared by every subcommand.

use std::sync::OnceLock;

use scrollscrape::RunSummary;

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
}

static MODE: OnceLock<OutputMode> = OnceLock::new();

/// Set once from the global flags, before any subcommand runs.
pub fn init(mode: OutputMode) {
    let _ = MODE.set(mode);
}

pub fn is_json() -> bool {
    MODE.get().is_some_and(|m| m.json)
}

pub fn is_quiet() -> bool {
    MODE.get().is_some_and(|m| m.quiet)
}

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// Print one run summary in the selected mode.
pub fn print_summary(summary: &RunSummary) {
    if is_json() {
        print_json(&serde_json::to_value(summary).unwrap_or_default());
        return;
    }
    if is_quiet() {
        return;
    }
    println!("  {}", summary.target_url);
    println!("    written:     {}", summary.written);
    println!("    duplicates:  {}", summary.duplicates);
    println!("    dropped:     {}", summary.dropped);
    if summary.failed_writes > 0 {
        println!("    failed:      {}", summary.failed_writes);
    }
    if summary.secondary_failed > 0 {
        println!("    mirror lost: {}", summary.secondary_failed);
    }
    if summary.refined > 0 || summary.refine_failed > 0 {
        println!(
            "    refined:     {} ({} failed)",
            summary.refined, summary.refine_failed
        );
    }
    println!("    iterations:  {}", summary.iterations);
    println!("    stopped:     {}", summary.termination);
    println!("    elapsed:     {:.1}s", summary.elapsed_ms as f64 / 1000.0);
}
