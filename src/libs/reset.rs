//! Daily budget reset.
//!
//! At every local midnight each rule starts a fresh budget: accumulated time
//! goes back to zero, expired rules become live again, and tabs that stay open
//! across midnight keep their attribution but start counting from the reset.

use crate::libs::clock::{last_local_midnight, Clock};
use crate::libs::rule::{Millis, Rule, RuleMap, RuleStatus};
use crate::libs::store::{RuleStore, StoreError};
use std::sync::Arc;
use tracing::info;

/// Resets a single rule at `now`.
pub fn reset_rule(rule: &mut Rule, now: Millis) {
    rule.past_cumulative_time = 0;
    match rule.status {
        RuleStatus::Expired => {
            rule.status = RuleStatus::Live;
            rule.tabs.clear();
        }
        RuleStatus::Live => {
            for tab in &mut rule.tabs {
                tab.opened_time = now;
            }
        }
    }
    rule.last_reset_time = Some(now);
}

pub fn apply_daily_reset(rules: &mut RuleMap, now: Millis) {
    for rule in rules.iter_mut() {
        reset_rule(rule, now);
    }
}

/// Resets rules whose last reset predates the most recent local midnight.
/// Rules that were never reset are only stamped. Returns the reset rule ids.
pub fn apply_catch_up_reset(rules: &mut RuleMap, now: Millis) -> Vec<u64> {
    let midnight = last_local_midnight(now);
    let mut reset = Vec::new();

    for rule in rules.iter_mut() {
        match rule.last_reset_time {
            None => rule.last_reset_time = Some(now),
            Some(last) if last < midnight => {
                reset_rule(rule, now);
                reset.push(rule.id);
            }
            Some(_) => {}
        }
    }

    reset
}

pub struct DailyReset {
    store: Arc<RuleStore>,
    clock: Arc<dyn Clock>,
}

impl DailyReset {
    pub fn new(store: Arc<RuleStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn run(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_millis();
        let count = self
            .store
            .update(|rules| {
                apply_daily_reset(rules, now);
                rules.len()
            })
            .await?;
        info!(rules = count, "daily reset applied");
        Ok(count)
    }

    /// Applies any reset missed while nothing was running.
    pub async fn catch_up(&self) -> Result<Vec<u64>, StoreError> {
        let now = self.clock.now_millis();
        let reset = self.store.update(|rules| apply_catch_up_reset(rules, now)).await?;
        if !reset.is_empty() {
            info!(rules = ?reset, "applied missed daily reset");
        }
        Ok(reset)
    }
}
