#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tabquota::libs::browser::{Browser, BrowserError, TabInfo};
use tabquota::libs::clock::{Clock, ManualClock};
use tabquota::libs::config::EngineConfig;
use tabquota::libs::engine::Engine;
use tabquota::libs::rule::{RuleMap, TabId};
use tabquota::libs::store::{KeyValueStore, MemoryStore, RuleStore};
use tokio::sync::watch;

pub const REDIRECT: &str = "https://example.com/";

/// Browser double: serves tab URLs from a table and records navigations.
/// Tab lookups can be held back to simulate a browser that is slow to answer.
pub struct FakeBrowser {
    tabs: Mutex<HashMap<TabId, Result<String, BrowserError>>>,
    navigations: Mutex<Vec<(TabId, String)>>,
    lookups: AtomicUsize,
    held: watch::Sender<bool>,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tabs: Mutex::new(HashMap::new()),
            navigations: Mutex::new(Vec::new()),
            lookups: AtomicUsize::new(0),
            held: watch::Sender::new(false),
        })
    }

    /// Lookups started from now on wait until [`FakeBrowser::release_lookups`].
    pub fn hold_lookups(&self) {
        self.held.send_replace(true);
    }

    pub fn release_lookups(&self) {
        self.held.send_replace(false);
    }

    /// Waits until at least `count` lookups have been started.
    pub async fn wait_for_lookups(&self, count: usize) {
        while self.lookups.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn open(&self, tab_id: TabId, url: &str) {
        self.tabs.lock().insert(tab_id, Ok(url.to_string()));
    }

    pub fn close(&self, tab_id: TabId) {
        self.tabs.lock().remove(&tab_id);
    }

    pub fn fail(&self, tab_id: TabId, error: BrowserError) {
        self.tabs.lock().insert(tab_id, Err(error));
    }

    pub fn navigations(&self) -> Vec<(TabId, String)> {
        self.navigations.lock().clone()
    }

    pub fn redirected(&self) -> Vec<TabId> {
        self.navigations.lock().iter().map(|(tab_id, _)| *tab_id).collect()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn get_tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        match self.tabs.lock().get(&tab_id) {
            Some(Ok(url)) => Ok(TabInfo { url: url.clone() }),
            Some(Err(e)) => Err(e.clone()),
            None => Err(BrowserError::NotFound(tab_id)),
        }
    }

    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError> {
        self.navigations.lock().push((tab_id, url.to_string()));
        if let Some(entry) = self.tabs.lock().get_mut(&tab_id) {
            *entry = Ok(url.to_string());
        }
        Ok(())
    }
}

/// An engine over in-memory storage, a fake browser and a manual clock.
pub struct Harness {
    pub engine: Engine,
    pub backend: Arc<MemoryStore>,
    pub browser: Arc<FakeBrowser>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(start: i64) -> Self {
        let backend = Arc::new(MemoryStore::new());
        let browser = FakeBrowser::new();
        let clock = Arc::new(ManualClock::new(start));
        let config = EngineConfig {
            redirect_url: REDIRECT.to_string(),
            ..EngineConfig::default()
        };

        let engine = Engine::new(
            Arc::clone(&backend) as Arc<dyn KeyValueStore>,
            Arc::clone(&browser) as Arc<dyn Browser>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            &config,
        );

        Self {
            engine,
            backend,
            browser,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        self.engine.store()
    }

    pub async fn add_rule(&self, url: &str, threshold: u32) -> u64 {
        let url = url.to_string();
        self.store().update(move |rules| rules.add(&url, threshold)).await.unwrap().unwrap()
    }

    pub async fn rules(&self) -> RuleMap {
        self.store().read().await.unwrap()
    }
}
