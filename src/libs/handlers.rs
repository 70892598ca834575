//! Tab and window lifecycle handling.
//!
//! Every browser event runs as one locked load → mutate → save cycle on the
//! rule store. The registry operations below work on an in-memory [`RuleMap`]
//! and report what they changed; [`EventHandler`] wraps them with persistence
//! and performs any redirects after the store lock has been released.
//!
//! ## Attribution
//!
//! A tab is attributed to at most one rule: the one whose base origin matches
//! the tab's current URL. Moving a tab to another domain closes its attribution
//! on the old rule (folding the elapsed time) before opening it on the new one.
//! Navigating inside the same base origin keeps the original `opened_time`.

use crate::libs::accounting::{check_expiry, fold_tab};
use crate::libs::browser::Redirector;
use crate::libs::clock::Clock;
use crate::libs::rule::{base_origin, Millis, RuleMap, Tab, TabId, WindowId};
use crate::libs::store::{RuleStore, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle events delivered by the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TabEvent {
    TabCreated {
        tab_id: TabId,
        window_id: WindowId,
        #[serde(default)]
        pending_url: Option<String>,
    },
    TabUpdated {
        tab_id: TabId,
        window_id: WindowId,
        /// Present only when the navigation changed the tab's URL.
        #[serde(default)]
        new_url: Option<String>,
        /// The tab's URL after the update.
        #[serde(default)]
        final_url: Option<String>,
    },
    TabRemoved {
        tab_id: TabId,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    TabAttached {
        tab_id: TabId,
        new_window_id: WindowId,
    },
}

/// Result of attributing a tab to the rule matching its URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    /// No rule matches and the tab was not attributed before.
    NoRule,
    /// The tab left a tracked domain for an untracked one.
    Released { rule_id: u64 },
    /// The tab is already attributed to the matching rule.
    Unchanged { rule_id: u64 },
    /// The tab now counts against the rule.
    Attributed { rule_id: u64 },
    /// The rule is expired: the tab was not attributed and must be redirected,
    /// together with any tabs still attributed to the rule.
    Blocked { rule_id: u64, redirect: Vec<TabId> },
}

/// Attributes `tab_id` to the rule matching `url`.
///
/// A previous attribution to a different rule is closed first. If the target
/// rule is (or just became) expired, the tab is left unattributed.
pub fn open_tab(rules: &mut RuleMap, tab_id: TabId, window_id: WindowId, url: &str, now: Millis) -> OpenOutcome {
    let base = base_origin(url);

    if let Some(owner) = rules.find_by_tab(tab_id) {
        if owner.url == base {
            return OpenOutcome::Unchanged { rule_id: owner.id };
        }
    }

    let previous = close_tab(rules, tab_id, now);

    let Some(rule) = rules.find_by_url_mut(&base) else {
        return match previous {
            Some(rule_id) => OpenOutcome::Released { rule_id },
            None => OpenOutcome::NoRule,
        };
    };

    if check_expiry(rule, now) {
        let mut redirect = vec![tab_id];
        redirect.extend(rule.tabs.iter().map(|tab| tab.tab_id).filter(|id| *id != tab_id));
        return OpenOutcome::Blocked { rule_id: rule.id, redirect };
    }

    rule.tabs.push(Tab::new(tab_id, window_id, now));
    debug!(rule_id = rule.id, tab_id, open_tabs = rule.tabs.len(), url = %rule.url, "tab attributed");
    OpenOutcome::Attributed { rule_id: rule.id }
}

/// Removes `tab_id` from whichever rule owns it, folding its elapsed time.
/// Returns the owning rule's id, or `None` for an unknown tab.
pub fn close_tab(rules: &mut RuleMap, tab_id: TabId, now: Millis) -> Option<u64> {
    let rule = rules.find_by_tab_mut(tab_id)?;
    let index = rule.tabs.iter().position(|tab| tab.tab_id == tab_id)?;
    let tab = rule.tabs.remove(index);
    fold_tab(rule, &tab, now);
    debug!(rule_id = rule.id, tab_id, remaining = rule.tabs.len(), url = %rule.url, "tab closed");
    Some(rule.id)
}

/// Closes every tab hosted by `window_id`. Returns how many were removed.
pub fn close_window(rules: &mut RuleMap, window_id: WindowId, now: Millis) -> usize {
    let mut removed = 0;
    for rule in rules.iter_mut() {
        let (closing, staying): (Vec<Tab>, Vec<Tab>) = std::mem::take(&mut rule.tabs)
            .into_iter()
            .partition(|tab| tab.window_id == window_id);
        for tab in &closing {
            fold_tab(rule, tab, now);
        }
        rule.tabs = staying;
        removed += closing.len();
    }
    removed
}

/// Records that `tab_id` now lives in `new_window_id`. Timing is unaffected.
pub fn move_tab(rules: &mut RuleMap, tab_id: TabId, new_window_id: WindowId) -> bool {
    let Some(tab) = rules
        .find_by_tab_mut(tab_id)
        .and_then(|rule| rule.tabs.iter_mut().find(|tab| tab.tab_id == tab_id))
    else {
        return false;
    };
    debug!(tab_id, from = tab.window_id, to = new_window_id, "tab moved");
    tab.window_id = new_window_id;
    true
}

/// Applies browser events to the rule store.
pub struct EventHandler {
    store: Arc<RuleStore>,
    redirector: Redirector,
    clock: Arc<dyn Clock>,
}

impl EventHandler {
    pub fn new(store: Arc<RuleStore>, redirector: Redirector, clock: Arc<dyn Clock>) -> Self {
        Self { store, redirector, clock }
    }

    /// Applies `event`, logging instead of propagating failures. A failed
    /// store access abandons the event; the next event or sweep catches up.
    pub async fn handle(&self, event: TabEvent) {
        if let Err(e) = self.apply(event.clone()).await {
            error!(error = %e, ?event, "failed to apply tab event");
        }
    }

    pub async fn apply(&self, event: TabEvent) -> Result<(), StoreError> {
        let redirect = {
            let guard = self.store.lock().await;
            let mut rules = guard.load().await?;
            let before = rules.clone();
            let now = self.clock.now_millis();

            let redirect = self.mutate(&mut rules, &event, now);

            if rules != before {
                guard.save(&rules).await?;
            }
            redirect
        };

        self.redirector.redirect_all(&redirect).await;
        Ok(())
    }

    /// Registry changes for one event; returns the tabs to redirect.
    fn mutate(&self, rules: &mut RuleMap, event: &TabEvent, now: Millis) -> Vec<TabId> {
        match event {
            TabEvent::TabCreated { tab_id, window_id, pending_url } => match pending_url {
                Some(url) => Self::on_open(rules, *tab_id, *window_id, url, now),
                None => {
                    debug!(tab_id, "tab created without a pending url, deferring attribution");
                    Vec::new()
                }
            },
            TabEvent::TabUpdated { tab_id, window_id, new_url, final_url } => match (new_url, final_url) {
                (Some(url), _) => Self::on_open(rules, *tab_id, *window_id, url, now),
                (None, Some(url)) if rules.find_by_tab(*tab_id).is_none() => {
                    Self::on_open(rules, *tab_id, *window_id, url, now)
                }
                _ => Vec::new(),
            },
            TabEvent::TabRemoved { tab_id } => {
                if close_tab(rules, *tab_id, now).is_none() {
                    debug!(tab_id, "removed tab was not attributed");
                }
                Vec::new()
            }
            TabEvent::WindowRemoved { window_id } => {
                let removed = close_window(rules, *window_id, now);
                debug!(window_id, removed, "window closed");
                Vec::new()
            }
            TabEvent::TabAttached { tab_id, new_window_id } => {
                move_tab(rules, *tab_id, *new_window_id);
                Vec::new()
            }
        }
    }

    fn on_open(rules: &mut RuleMap, tab_id: TabId, window_id: WindowId, url: &str, now: Millis) -> Vec<TabId> {
        match open_tab(rules, tab_id, window_id, url, now) {
            OpenOutcome::Blocked { rule_id, redirect } => {
                info!(rule_id, tab_id, "rule is expired, redirecting");
                redirect
            }
            OpenOutcome::Released { rule_id } => {
                debug!(rule_id, tab_id, "tab left tracked domain");
                Vec::new()
            }
            OpenOutcome::NoRule | OpenOutcome::Unchanged { .. } | OpenOutcome::Attributed { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::rule::{Rule, RuleStatus};

    fn two_rules() -> RuleMap {
        vec![Rule::new(1, "https://a.example", 10), Rule::new(2, "https://b.example", 10)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_open_attributes_matching_rule() {
        let mut rules = two_rules();
        let outcome = open_tab(&mut rules, 100, 1, "https://a.example/feed?x=1", 0);

        assert_eq!(outcome, OpenOutcome::Attributed { rule_id: 1 });
        assert_eq!(rules.get(1).unwrap().tabs, vec![Tab::new(100, 1, 0)]);
    }

    #[test]
    fn test_open_untracked_url_is_ignored() {
        let mut rules = two_rules();
        let before = rules.clone();
        assert_eq!(open_tab(&mut rules, 100, 1, "https://c.example", 0), OpenOutcome::NoRule);
        assert_eq!(rules, before);
    }

    #[test]
    fn test_same_origin_navigation_keeps_opened_time() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example/one", 0);
        let outcome = open_tab(&mut rules, 100, 1, "https://a.example/two", 5_000);

        assert_eq!(outcome, OpenOutcome::Unchanged { rule_id: 1 });
        assert_eq!(rules.get(1).unwrap().tabs[0].opened_time, 0);
        assert_eq!(rules.get(1).unwrap().past_cumulative_time, 0);
    }

    #[test]
    fn test_cross_domain_navigation_moves_attribution() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example", 0);
        let outcome = open_tab(&mut rules, 100, 1, "https://b.example/watch", 5_000);

        assert_eq!(outcome, OpenOutcome::Attributed { rule_id: 2 });
        let a = rules.get(1).unwrap();
        assert!(a.tabs.is_empty());
        assert_eq!(a.past_cumulative_time, 5_000);
        assert_eq!(rules.get(2).unwrap().tabs, vec![Tab::new(100, 1, 5_000)]);
    }

    #[test]
    fn test_navigation_to_untracked_domain_releases_tab() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example", 0);
        let outcome = open_tab(&mut rules, 100, 1, "https://elsewhere.example", 2_500);

        assert_eq!(outcome, OpenOutcome::Released { rule_id: 1 });
        assert_eq!(rules.get(1).unwrap().past_cumulative_time, 2_500);
        assert!(rules.find_by_tab(100).is_none());
    }

    #[test]
    fn test_open_on_expired_rule_blocks_and_lists_attributed_tabs() {
        let mut rules = two_rules();
        let rule = rules.get_mut(1).unwrap();
        rule.status = RuleStatus::Expired;
        rule.tabs.push(Tab::new(7, 1, 0));

        let outcome = open_tab(&mut rules, 100, 2, "https://a.example", 1_000);

        assert_eq!(outcome, OpenOutcome::Blocked { rule_id: 1, redirect: vec![100, 7] });
        assert!(!rules.get(1).unwrap().has_tab(100));
    }

    #[test]
    fn test_open_that_crosses_threshold_expires_rule() {
        let mut rules: RuleMap = std::iter::once(Rule::new(1, "https://a.example", 1)).collect();
        open_tab(&mut rules, 100, 1, "https://a.example", 0);

        let outcome = open_tab(&mut rules, 101, 1, "https://a.example", 60_000);

        assert_eq!(outcome, OpenOutcome::Blocked { rule_id: 1, redirect: vec![101, 100] });
        let rule = rules.get(1).unwrap();
        assert_eq!(rule.status, RuleStatus::Expired);
        assert_eq!(rule.past_cumulative_time, 60_000);
    }

    #[test]
    fn test_close_folds_exact_elapsed_time() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example", 1_000);

        assert_eq!(close_tab(&mut rules, 100, 4_500), Some(1));
        assert_eq!(rules.get(1).unwrap().past_cumulative_time, 3_500);
        assert!(rules.find_by_tab(100).is_none());
    }

    #[test]
    fn test_redundant_close_is_a_no_op() {
        let mut rules = two_rules();
        let before = rules.clone();
        assert_eq!(close_tab(&mut rules, 999, 10), None);
        assert_eq!(rules, before);
    }

    #[test]
    fn test_window_close_folds_only_that_window() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example", 0);
        open_tab(&mut rules, 101, 2, "https://a.example", 0);
        open_tab(&mut rules, 200, 1, "https://b.example", 1_000);

        assert_eq!(close_window(&mut rules, 1, 3_000), 2);

        let a = rules.get(1).unwrap();
        assert_eq!(a.tab_ids(), vec![101]);
        assert_eq!(a.past_cumulative_time, 3_000);
        let b = rules.get(2).unwrap();
        assert!(b.tabs.is_empty());
        assert_eq!(b.past_cumulative_time, 2_000);
        assert!(rules.iter().all(|rule| rule.tabs.iter().all(|tab| tab.window_id != 1)));
    }

    #[test]
    fn test_move_updates_window_only() {
        let mut rules = two_rules();
        open_tab(&mut rules, 100, 1, "https://a.example", 123);

        assert!(move_tab(&mut rules, 100, 9));
        assert_eq!(rules.get(1).unwrap().tabs, vec![Tab::new(100, 9, 123)]);
        assert!(!move_tab(&mut rules, 555, 9));
    }

    #[test]
    fn test_event_wire_format() {
        let json = r#"{"type":"tab_updated","tabId":5,"windowId":2,"newUrl":"https://a.example/x","finalUrl":"https://a.example/x"}"#;
        let event: TabEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            TabEvent::TabUpdated {
                tab_id: 5,
                window_id: 2,
                new_url: Some("https://a.example/x".into()),
                final_url: Some("https://a.example/x".into()),
            }
        );

        let json = r#"{"type":"tab_created","tabId":5,"windowId":2}"#;
        let event: TabEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, TabEvent::TabCreated { tab_id: 5, window_id: 2, pending_url: None });
    }
}
