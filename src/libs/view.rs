use super::accounting::{charged_time, used_minutes};
use super::rule::{Millis, Rule, RuleStatus};
use prettytable::{row, Table};

pub struct View {}

impl View {
    pub fn rules(rules: &[&Rule]) {
        Self::rules_table(rules).printstd();
    }

    pub fn usage(rules: &[&Rule], now: Millis) {
        Self::usage_table(rules, now).printstd();
    }

    pub fn rules_table(rules: &[&Rule]) -> Table {
        let mut table = Table::new();

        table.add_row(row!["ID", "URL", "LIMIT (MIN)", "STATUS", "OPEN TABS"]);
        for rule in rules {
            table.add_row(row![rule.id, rule.url, rule.threshold, status_label(rule.status), rule.tabs.len()]);
        }

        table
    }

    /// Minutes used today including time of tabs that are still open.
    pub fn usage_table(rules: &[&Rule], now: Millis) -> Table {
        let mut table = Table::new();

        table.add_row(row!["ID", "URL", "USED (MIN)", "LIMIT (MIN)", "USED %", "OPEN TABS", "STATUS"]);
        for rule in rules {
            table.add_row(row![
                rule.id,
                rule.url,
                used_minutes(rule, now),
                rule.threshold,
                format!("{}%", used_percent(rule, now)),
                rule.tabs.len(),
                status_label(rule.status)
            ]);
        }

        table
    }
}

fn status_label(status: RuleStatus) -> &'static str {
    match status {
        RuleStatus::Live => "live",
        RuleStatus::Expired => "expired",
    }
}

fn used_percent(rule: &Rule, now: Millis) -> i64 {
    let budget = rule.threshold_millis();
    if budget == 0 {
        return 100;
    }
    charged_time(rule, now) * 100 / budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::rule::Tab;

    fn cell(table: &Table, row: usize, col: usize) -> String {
        table.get_row(row).and_then(|r| r.get_cell(col)).map(|c| c.get_content()).unwrap_or_default()
    }

    #[test]
    fn test_usage_counts_open_tabs() {
        let mut rule = Rule::new(1, "https://a.example", 10);
        rule.past_cumulative_time = 120_000;
        rule.tabs.push(Tab::new(100, 1, 0));

        let table = View::usage_table(&[&rule], 180_000);

        assert_eq!(table.len(), 2);
        assert_eq!(cell(&table, 1, 2), "5");
        assert_eq!(cell(&table, 1, 4), "50%");
        assert_eq!(cell(&table, 1, 5), "1");
        assert_eq!(cell(&table, 1, 6), "live");
    }

    #[test]
    fn test_zero_threshold_reports_full_usage() {
        let rule = Rule::new(2, "https://b.example", 0);
        let table = View::usage_table(&[&rule], 0);
        assert_eq!(cell(&table, 1, 4), "100%");
    }
}
