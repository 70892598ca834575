//! Native host lifecycle for the `watch` command.
//!
//! Chrome starts the host with the extension's port connected to stdin/stdout
//! and expects it to live until the port closes. The host therefore runs until
//! stdin reaches EOF or the process receives SIGINT/SIGTERM (Ctrl+C on
//! Windows), and then stops the periodic tasks before exiting.
//!
//! Nothing here may print to stdout; every message goes through `tracing`,
//! which writes to stderr.

use crate::db::kv::SqliteStore;
use crate::libs::browser::Browser;
use crate::libs::clock::SystemClock;
use crate::libs::config::{Config, EngineConfig};
use crate::libs::engine::Engine;
use crate::libs::messages::Message;
use crate::libs::native_host::{serve, NativeBrowser};
use crate::libs::store::KeyValueStore;
use crate::msg_error_anyhow;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info};

/// Serves the browser on stdin/stdout with signal handling for graceful shutdown.
pub async fn run_with_signal_handling() -> Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(|e| msg_error_anyhow!(Message::SignalHandlerFailed(e.to_string())))?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(|e| msg_error_anyhow!(Message::SignalHandlerFailed(e.to_string())))?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("{}", Message::WatcherReceivedSigterm),
                _ = sigint.recv() => info!("{}", Message::WatcherReceivedSigint),
            }
            let _ = shutdown_tx.send(());
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("{}", Message::WatcherReceivedCtrlC),
                Err(e) => error!("{}", Message::WatcherCtrlCListenFailed(e.to_string())),
            }
            let _ = shutdown_tx.send(());
        });
    }

    #[cfg(not(any(unix, windows)))]
    drop(shutdown_tx);

    let config = Config::read()?.engine.unwrap_or_default();
    let backend: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::new()?);

    tokio::select! {
        result = run_host(tokio::io::stdin(), tokio::io::stdout(), backend, config) => {
            match result {
                Ok(()) => info!("{}", Message::HostExitedNormally),
                Err(e) => error!("{}", Message::HostError(e.to_string())),
            }
        }
        Ok(()) = shutdown_rx => {
            info!("{}", Message::HostShuttingDown);
        }
    }

    Ok(())
}

/// Runs the engine against one browser connection until it closes.
pub async fn run_host<R, W>(reader: R, writer: W, backend: Arc<dyn KeyValueStore>, config: EngineConfig) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (browser, frames) = NativeBrowser::channel(config.response_timeout());
    let actuator: Arc<dyn Browser> = browser.clone();
    let mut engine = Engine::new(backend, actuator, Arc::new(SystemClock), &config);

    let caught_up = engine.start().await;
    if !caught_up.is_empty() {
        info!("{}", Message::CatchUpResetApplied(caught_up.len()));
    }
    info!("{}", Message::HostStarted(config.storage_key.clone()));

    let result = serve(reader, writer, frames, browser, engine.handler()).await;
    engine.stop();
    Ok(result?)
}
