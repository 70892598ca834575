//! Rule store: whole-collection persistence behind a single-writer lock.
//!
//! The backing [`KeyValueStore`] only offers `get` and `set` of one serialized
//! value, with no compare-and-swap. Two handlers that both load the collection
//! before either saves would silently overwrite each other. [`RuleStore`]
//! closes that gap by serializing every load → mutate → save sequence through
//! an async mutex: callers take a [`RuleStoreGuard`] with [`RuleStore::lock`]
//! and hold it for their whole read-modify-write cycle.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo(store: &tabquota::libs::store::RuleStore) -> Result<(), tabquota::libs::store::StoreError> {
//! let guard = store.lock().await;
//! let mut rules = guard.load().await?;
//! for rule in rules.iter_mut() {
//!     rule.past_cumulative_time = 0;
//! }
//! guard.save(&rules).await?;
//! # Ok(())
//! # }
//! ```

use crate::libs::rule::RuleMap;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::MutexGuard;
use tracing::{debug, error, warn};

/// Storage key used when the configuration does not name one.
pub const DEFAULT_STORAGE_KEY: &str = "tabquota_block_map";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("rule collection is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value persistence contract. Both operations may fail transiently.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get`/`set` fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }
}

pub struct RuleStore {
    backend: Arc<dyn KeyValueStore>,
    key: String,
    lock: tokio::sync::Mutex<()>,
}

impl RuleStore {
    pub fn new(backend: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Enters the store's mutual-exclusion scope. Waiters are served in FIFO
    /// order, so events keep their arrival order.
    pub async fn lock(&self) -> RuleStoreGuard<'_> {
        RuleStoreGuard {
            store: self,
            _guard: self.lock.lock().await,
        }
    }

    /// Consistent snapshot of the collection.
    pub async fn read(&self) -> Result<RuleMap, StoreError> {
        self.lock().await.load().await
    }

    /// Runs `mutate` inside one locked load/save cycle.
    pub async fn update<F, T>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut RuleMap) -> T + Send,
        T: Send,
    {
        let guard = self.lock().await;
        let mut rules = guard.load().await?;
        let result = mutate(&mut rules);
        guard.save(&rules).await?;
        Ok(result)
    }
}

/// Proof that the holder owns the store's read-modify-write scope.
pub struct RuleStoreGuard<'a> {
    store: &'a RuleStore,
    _guard: MutexGuard<'a, ()>,
}

impl RuleStoreGuard<'_> {
    /// Reads the collection. Records that fail validation are set aside and
    /// only the collection as a whole being unreadable is an error.
    pub async fn load(&self) -> Result<RuleMap, StoreError> {
        let rules: RuleMap = match self.store.backend.get(&self.store.key).await? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw)?,
            _ => RuleMap::new(),
        };
        for key in rules.malformed_keys() {
            warn!(key, "malformed rule record ignored");
        }
        Ok(rules)
    }

    /// Writes the whole collection. Set-aside records are written back as they
    /// were read; in-memory rules without a valid id are skipped.
    pub async fn save(&self, rules: &RuleMap) -> Result<(), StoreError> {
        for key in rules.unsaveable_keys() {
            error!(key, "rule has no valid id, skipping its save");
        }

        let raw = serde_json::to_string(rules)?;
        self.store.backend.set(&self.store.key, raw).await?;
        debug!(rules = rules.len(), "rule collection saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::rule::{Rule, RuleStatus, Tab};

    fn memory_rule_store() -> (Arc<MemoryStore>, RuleStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = RuleStore::new(Arc::clone(&backend) as Arc<dyn KeyValueStore>, DEFAULT_STORAGE_KEY);
        (backend, store)
    }

    #[tokio::test]
    async fn test_empty_store_loads_empty_map() {
        let (_backend, store) = memory_rule_store();
        assert!(store.read().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_preserves_every_field() {
        let (_backend, store) = memory_rule_store();
        let mut rule = Rule::new(4, "https://example.org", 30);
        rule.status = RuleStatus::Expired;
        rule.tabs = vec![Tab::new(100, 2, 1_000), Tab::new(101, 3, 2_000)];
        rule.past_cumulative_time = 42_000;
        rule.last_reset_time = Some(99);
        let rules: RuleMap = vec![rule, Rule::new(5, "https://example.com", 0)].into_iter().collect();

        store.update(|stored| *stored = rules.clone()).await.unwrap();

        assert_eq!(store.read().await.unwrap(), rules);
    }

    #[tokio::test]
    async fn test_malformed_record_does_not_block_other_rules() {
        let (backend, store) = memory_rule_store();
        backend
            .set(
                DEFAULT_STORAGE_KEY,
                r#"{"1": {"id": 1, "url": "https://a.example", "threshold": 5},
                    "2": {"id": 0, "url": "https://b.example", "threshold": 5}}"#
                    .into(),
            )
            .await
            .unwrap();

        store
            .update(|rules| rules.get_mut(1).unwrap().tabs.push(Tab::new(100, 1, 0)))
            .await
            .unwrap();

        let stored = store.read().await.unwrap();
        assert_eq!(stored.get(1).unwrap().tab_ids(), vec![100]);
        assert_eq!(stored.malformed_keys(), vec!["2"]);

        let raw: serde_json::Value = serde_json::from_str(&backend.get(DEFAULT_STORAGE_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(raw["2"]["id"], 0);
        assert_eq!(raw["2"]["url"], "https://b.example");
    }

    #[tokio::test]
    async fn test_unsaveable_rule_is_skipped_and_the_rest_saved() {
        let (_backend, store) = memory_rule_store();
        let guard = store.lock().await;
        let mut rules = RuleMap::new();
        rules.insert(Rule::new(1, "https://a.example", 5));
        rules.insert(Rule::new(0, "https://zero.example", 5));
        guard.save(&rules).await.unwrap();
        drop(guard);

        let stored = store.read().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.get(1).is_some());
        assert!(stored.malformed_keys().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_surfaces_as_error() {
        let (backend, store) = memory_rule_store();
        backend.set_failing(true);
        assert!(matches!(store.read().await, Err(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (_backend, store) = memory_rule_store();
        store.update(|rules| rules.insert(Rule::new(1, "https://a.example", 60))).await.unwrap();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let guard = store.lock().await;
                let mut rules = guard.load().await.unwrap();
                tokio::task::yield_now().await;
                if let Some(rule) = rules.get_mut(1) {
                    rule.past_cumulative_time += 1_000;
                }
                guard.save(&rules).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let rules = store.read().await.unwrap();
        assert_eq!(rules.get(1).unwrap().past_cumulative_time, 20_000);
    }
}
