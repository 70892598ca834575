//! Periodic expiry sweep and registry reconciliation.
//!
//! Not every close or navigation reaches the host as an event, so attributed
//! tabs can go stale. Each sweep runs three passes:
//!
//! 1. **Expiry**: every rule is checked against its budget; the tabs of rules
//!    that expire in this pass are queued for redirection.
//! 2. **Cleanup**: expired rules drop all their tabs. Their time was already
//!    folded into the stored total when they expired.
//! 3. **Validation**: every remaining tab is looked up in the browser and kept
//!    only if it still exists on the rule's base origin.
//!
//! Expiry and cleanup run under the store lock, which is then released while
//! the browser is queried. Lookups run concurrently, so a browser that stops
//! answering costs one response timeout per sweep. Verdicts are applied under a
//! second lock, and only to entries that are still exactly as snapshotted.
//! Redirects are issued after the store lock is released.

use crate::libs::accounting::{check_expiry, fold_tab};
use crate::libs::browser::{Browser, BrowserError, Redirector};
use crate::libs::clock::Clock;
use crate::libs::rule::{base_origin, Tab, TabId};
use crate::libs::store::{RuleStore, StoreError};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Rules that crossed their threshold during this sweep.
    pub newly_expired: Vec<u64>,
    /// Tabs sent to the redirect destination.
    pub redirected: Vec<TabId>,
    /// Stale tab entries removed by validation.
    pub dropped: Vec<TabId>,
}

/// A tab attribution as it stood when the sweep released the lock.
#[derive(Debug, Clone)]
struct Attribution {
    rule_id: u64,
    rule_url: String,
    tab: Tab,
}

pub struct Sweeper {
    store: Arc<RuleStore>,
    browser: Arc<dyn Browser>,
    redirector: Redirector,
    clock: Arc<dyn Clock>,
}

impl Sweeper {
    pub fn new(store: Arc<RuleStore>, browser: Arc<dyn Browser>, redirector: Redirector, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            browser,
            redirector,
            clock,
        }
    }

    pub async fn run(&self) -> Result<SweepReport, StoreError> {
        let mut report = SweepReport::default();

        let attributions = self.expire(&mut report).await?;
        self.redirector.redirect_all(&report.redirected).await;

        let stale = self.find_stale(attributions).await;
        if !stale.is_empty() {
            report.dropped = self.drop_stale(&stale).await?;
        }

        Ok(report)
    }

    /// Expiry and cleanup. Returns every tab still attributed to a live rule.
    async fn expire(&self, report: &mut SweepReport) -> Result<Vec<Attribution>, StoreError> {
        let guard = self.store.lock().await;
        let mut rules = guard.load().await?;
        let before = rules.clone();
        let now = self.clock.now_millis();

        for rule in rules.iter_mut() {
            let was_expired = rule.is_expired();
            if check_expiry(rule, now) && !was_expired {
                info!(rule_id = rule.id, url = %rule.url, used_ms = rule.past_cumulative_time, "rule expired");
                report.newly_expired.push(rule.id);
                report.redirected.extend(rule.tab_ids());
            }
        }

        let mut attributions = Vec::new();
        for rule in rules.iter_mut() {
            if rule.is_expired() {
                rule.tabs.clear();
                continue;
            }
            attributions.extend(rule.tabs.iter().map(|tab| Attribution {
                rule_id: rule.id,
                rule_url: rule.url.clone(),
                tab: tab.clone(),
            }));
        }

        if rules != before {
            guard.save(&rules).await?;
        }
        Ok(attributions)
    }

    async fn find_stale(&self, attributions: Vec<Attribution>) -> Vec<Attribution> {
        let verdicts = join_all(attributions.iter().map(|entry| self.is_tab_current(entry))).await;
        attributions
            .into_iter()
            .zip(verdicts)
            .filter_map(|(entry, current)| (!current).then_some(entry))
            .collect()
    }

    /// Folds and removes stale entries. An entry closed, moved or reopened
    /// since the snapshot was taken is left to the handlers that changed it.
    async fn drop_stale(&self, stale: &[Attribution]) -> Result<Vec<TabId>, StoreError> {
        let guard = self.store.lock().await;
        let mut rules = guard.load().await?;
        let now = self.clock.now_millis();
        let mut dropped = Vec::new();

        for entry in stale {
            let Some(rule) = rules.get_mut(entry.rule_id) else {
                continue;
            };
            if rule.is_expired() || rule.url != entry.rule_url {
                continue;
            }
            let Some(index) = rule.tabs.iter().position(|tab| *tab == entry.tab) else {
                debug!(tab_id = entry.tab.tab_id, "stale tab already changed, skipping");
                continue;
            };
            let tab = rule.tabs.remove(index);
            fold_tab(rule, &tab, now);
            dropped.push(tab.tab_id);
        }

        if !dropped.is_empty() {
            guard.save(&rules).await?;
        }
        Ok(dropped)
    }

    async fn is_tab_current(&self, entry: &Attribution) -> bool {
        let tab_id = entry.tab.tab_id;
        let rule_url = entry.rule_url.as_str();
        match self.browser.get_tab_info(tab_id).await {
            Ok(info) => {
                let current = base_origin(&info.url);
                if current == rule_url {
                    return true;
                }
                debug!(tab_id, rule_url, current = %current, "tab navigated away without an event");
                false
            }
            Err(BrowserError::NotFound(_)) => {
                debug!(tab_id, rule_url, "tab closed without an event");
                false
            }
            Err(e) => {
                // Can't tell either way; keep the entry for the next sweep.
                warn!(tab_id, error = %e, "tab validation failed");
                true
            }
        }
    }
}

