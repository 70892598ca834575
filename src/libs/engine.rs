//! Wiring of the enforcement engine.
//!
//! [`Engine`] builds every component around one shared [`RuleStore`] and one
//! [`Browser`], so event handlers, the sweep and the daily reset all serialize
//! on the same store lock and redirect through the same actuator.

use crate::libs::browser::{Browser, Redirector};
use crate::libs::clock::Clock;
use crate::libs::config::EngineConfig;
use crate::libs::handlers::EventHandler;
use crate::libs::reset::DailyReset;
use crate::libs::scheduler::Scheduler;
use crate::libs::store::{KeyValueStore, RuleStore, StoreError};
use crate::libs::sweep::Sweeper;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Engine {
    store: Arc<RuleStore>,
    handler: Arc<EventHandler>,
    sweeper: Arc<Sweeper>,
    reset: Arc<DailyReset>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(backend: Arc<dyn KeyValueStore>, browser: Arc<dyn Browser>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        let store = Arc::new(RuleStore::new(backend, config.storage_key.clone()));
        let redirector = Redirector::new(Arc::clone(&browser), config.redirect_url.clone());

        let handler = Arc::new(EventHandler::new(Arc::clone(&store), redirector.clone(), Arc::clone(&clock)));
        let sweeper = Arc::new(Sweeper::new(Arc::clone(&store), browser, redirector, Arc::clone(&clock)));
        let reset = Arc::new(DailyReset::new(Arc::clone(&store), clock));
        let scheduler = Scheduler::new(Arc::clone(&sweeper), Arc::clone(&reset), config.sweep_interval());

        Self {
            store,
            handler,
            sweeper,
            reset,
            scheduler,
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    pub fn handler(&self) -> Arc<EventHandler> {
        Arc::clone(&self.handler)
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    /// Applies any daily reset missed while the host was down, then starts the
    /// periodic tasks. A failed catch-up is logged and does not prevent startup.
    pub async fn start(&mut self) -> Vec<u64> {
        let caught_up = match self.reset.catch_up().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "catch-up reset failed");
                Vec::new()
            }
        };
        self.scheduler.start();
        info!(storage_key = self.store.key(), "engine started");
        caught_up
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Runs one daily reset immediately.
    pub async fn reset_now(&self) -> Result<usize, StoreError> {
        self.reset.run().await
    }
}
