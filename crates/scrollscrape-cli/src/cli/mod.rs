//! CLI subcommand implementations for the scrollscrape binary.

pub mod args;
pub mod batch_cmd;
pub mod db_cmd;
pub mod doctor;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scrape_cmd;
pub mod templates_cmd;

use tokio_util::sync::CancellationToken;
use tracing::info;

/// A token cancelled by the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current iteration");
            token.cancel();
        }
    });
    cancel
}
