pub mod init;
pub mod manifest;
pub mod reset;
pub mod rule;
pub mod usage;
pub mod watch;

use crate::db::kv::SqliteStore;
use crate::libs::config::Config;
use crate::libs::store::{KeyValueStore, RuleStore};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;

/// Chrome launches a native host with the calling extension's origin as the
/// first argument.
const CHROME_ORIGIN_PREFIX: &str = "chrome-extension://";

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Configuration initialization")]
    Init(init::InitArgs),
    #[command(about = "Manage blocking rules", arg_required_else_help = true)]
    Rule(rule::RuleArgs),
    #[command(about = "Show time used today per rule")]
    Usage,
    #[command(about = "Apply the daily budget reset now")]
    Reset,
    #[command(about = "Serve the browser extension over native messaging")]
    Watch,
    #[command(about = "Print the native messaging host manifest")]
    Manifest(manifest::ManifestArgs),
}

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help(true))]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub async fn menu() -> Result<()> {
        if std::env::args().nth(1).is_some_and(|arg| arg.starts_with(CHROME_ORIGIN_PREFIX)) {
            return watch::cmd().await;
        }

        let cli = Self::parse();
        match cli.command {
            Commands::Init(args) => init::cmd(args),
            Commands::Rule(args) => rule::cmd(args).await,
            Commands::Usage => usage::cmd().await,
            Commands::Reset => reset::cmd().await,
            Commands::Watch => watch::cmd().await,
            Commands::Manifest(args) => manifest::cmd(args),
        }
    }
}

/// Rule store on the local database, under the configured storage key.
pub(crate) fn open_rule_store() -> Result<Arc<RuleStore>> {
    let engine = Config::read()?.engine.unwrap_or_default();
    let backend: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new()?);
    Ok(Arc::new(RuleStore::new(backend, engine.storage_key)))
}
