//! Time accounting for rules.
//!
//! The time charged against a rule is the time already folded into
//! `past_cumulative_time` plus the live time of every tab still attributed to
//! it. A tab contributes through exactly one of the two terms: it is counted live
//! while it sits in `tabs`, and its elapsed time is moved into
//! `past_cumulative_time` in the same mutation that removes it.
//!
//! [`check_expiry`] is the only place a rule moves from LIVE to EXPIRED. It
//! folds the live time into the stored total at that moment, so later cleanup
//! can drop the expired rule's tabs without losing any of their time. From then
//! on the charged time of an expired rule is frozen: tabs still attributed to it
//! contribute nothing, and folding them is a no-op.

use crate::libs::rule::{Millis, Rule, RuleStatus, Tab};

/// Sum of the live time of every tab attributed to a live `rule`.
pub fn live_time(rule: &Rule, now: Millis) -> Millis {
    if rule.is_expired() {
        return 0;
    }
    rule.tabs.iter().map(|tab| tab.elapsed(now)).sum()
}

/// Total time charged against `rule` as of `now`.
pub fn charged_time(rule: &Rule, now: Millis) -> Millis {
    rule.past_cumulative_time + live_time(rule, now)
}

/// Whole minutes used, rounded to the nearest minute.
pub fn used_minutes(rule: &Rule, now: Millis) -> i64 {
    let charged = charged_time(rule, now);
    (charged + 30_000) / 60_000
}

/// Decides whether `rule` is expired at `now`, recording the transition.
///
/// An already expired rule returns `true` without being re-evaluated. A live
/// rule whose charged time meets its threshold becomes EXPIRED with the live
/// time folded into `past_cumulative_time`, and `true` is returned. Otherwise
/// the rule is left untouched. The caller must persist the rule when this
/// returns `true` for a rule that was live.
pub fn check_expiry(rule: &mut Rule, now: Millis) -> bool {
    if rule.is_expired() {
        return true;
    }

    let total = charged_time(rule, now);
    if total >= rule.threshold_millis() {
        rule.status = RuleStatus::Expired;
        rule.past_cumulative_time = total;
        return true;
    }

    false
}

/// Moves the elapsed time of `tab` into the rule's stored total.
pub fn fold_tab(rule: &mut Rule, tab: &Tab, now: Millis) {
    if rule.is_expired() {
        return;
    }
    rule.past_cumulative_time += tab.elapsed(now);
}
