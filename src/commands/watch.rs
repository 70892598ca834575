use crate::libs::daemon;
use anyhow::Result;

/// Runs the native host until the browser disconnects or a signal arrives.
pub async fn cmd() -> Result<()> {
    daemon::run_with_signal_handling().await?;
    // tokio's stdin reader blocks a pool thread, which would stall runtime shutdown
    std::process::exit(0);
}
