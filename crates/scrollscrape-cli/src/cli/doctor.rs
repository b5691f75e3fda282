//! Environment readiness check.

use anyhow::Result;

use scrollscrape::auth::{resolve_state_path, SessionState};
use scrollscrape::config::OPENAI_API_KEY_ENV;
use scrollscrape::renderer::chromium::{find_chromium, CHROMIUM_PATH_ENV};

use crate::cli::output;

/// Check Chromium, the session artifact and the refinement API key.
pub async fn run() -> Result<()> {
    let chromium = find_chromium();
    let state_path = resolve_state_path(None);
    let state = match SessionState::load(&state_path) {
        Ok(state) => Ok(state.cookies.len()),
        Err(e) => Err(e.to_string()),
    };
    let api_key = std::env::var(OPENAI_API_KEY_ENV).is_ok_and(|k| !k.trim().is_empty());

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "chromium": chromium,
            "storage_state": {
                "path": state_path,
                "cookies": state.as_ref().ok(),
                "error": state.as_ref().err(),
            },
            "openai_api_key": api_key,
            "ready": chromium.is_some(),
        }));
        return Ok(());
    }

    println!("Scrollscrape Doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set {CHROMIUM_PATH_ENV}."
        ),
    }
    match &state {
        Ok(cookies) => println!(
            "[OK] Session artifact {} ({cookies} cookies)",
            state_path.display()
        ),
        Err(e) => println!("[??] No usable session artifact: {e}"),
    }
    if api_key {
        println!("[OK] {OPENAI_API_KEY_ENV} is set");
    } else {
        println!("[??] {OPENAI_API_KEY_ENV} not set (needed for --refine openai)");
    }

    println!();
    if chromium.is_some() {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
    }
    Ok(())
}
