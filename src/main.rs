use tabquota::commands::Cli;
use tracing_subscriber::EnvFilter;

/// Logs go to stderr; stdout is reserved for command output and, while
/// serving the browser, for native messaging frames.
fn init_tracing() {
    let default_level = if std::env::var("TABQUOTA_DEBUG").is_ok() { "warn,tabquota=debug" } else { "warn,tabquota=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    Cli::menu().await
}
