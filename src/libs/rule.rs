//! Rule and tab records as they are persisted in the rule store.
//!
//! A [`Rule`] is the budget configuration for one base origin together with the
//! usage accumulated since its last daily reset. The tabs currently attributed to
//! the rule are kept inline, so the whole registry travels with the collection
//! and is saved in a single write.
//!
//! The persisted layout is a JSON object keyed by the string form of each rule id:
//!
//! ```json
//! {
//!   "1": {
//!     "id": 1,
//!     "url": "https://example.org",
//!     "threshold": 30,
//!     "status": "live",
//!     "tabs": [{ "tabId": 100, "windowId": 1, "openedTime": 1700000000000 }],
//!     "pastCumulativeTime": 0,
//!     "lastResetTime": 1699999000000
//!   }
//! }
//! ```

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

pub const DEFAULT_THRESHOLD_MINUTES: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("'{0}' is not a valid http(s) URL")]
    InvalidUrl(String),

    #[error("a rule for {0} already exists")]
    AlreadyExists(String),
}

/// Milliseconds since the Unix epoch.
pub type Millis = i64;

pub const MILLIS_PER_MINUTE: Millis = 60_000;

/// Browser-assigned tab identifier.
pub type TabId = i64;

/// Browser-assigned window identifier.
pub type WindowId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    #[default]
    Live,
    Expired,
}

/// An open browser tab attributed to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub tab_id: TabId,
    pub window_id: WindowId,
    pub opened_time: Millis,
}

impl Tab {
    pub fn new(tab_id: TabId, window_id: WindowId, opened_time: Millis) -> Self {
        Self { tab_id, window_id, opened_time }
    }

    /// Time this tab has been attributed as of `now`, never negative.
    pub fn elapsed(&self, now: Millis) -> Millis {
        (now - self.opened_time).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: u64,
    pub url: String,
    /// Daily budget in minutes.
    pub threshold: u32,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub past_cumulative_time: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset_time: Option<Millis>,
}

impl Rule {
    pub fn new(id: u64, url: impl Into<String>, threshold: u32) -> Self {
        Self {
            id,
            url: url.into(),
            threshold,
            status: RuleStatus::Live,
            tabs: Vec::new(),
            past_cumulative_time: 0,
            last_reset_time: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.status == RuleStatus::Expired
    }

    pub fn threshold_millis(&self) -> Millis {
        Millis::from(self.threshold) * MILLIS_PER_MINUTE
    }

    pub fn has_tab(&self, tab_id: TabId) -> bool {
        self.tabs.iter().any(|tab| tab.tab_id == tab_id)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.iter().map(|tab| tab.tab_id).collect()
    }
}

/// The whole rule collection, keyed by rule id.
///
/// Serialized as a JSON object whose keys are the decimal ids, which is the
/// shape the settings UI reads and writes.
///
/// Entries are validated one by one. A record that does not parse, has a zero
/// id, or sits under a key other than its id is set aside and written back
/// exactly as it was read, so the remaining rules keep being enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleMap {
    rules: BTreeMap<String, Rule>,
    malformed: BTreeMap<String, Value>,
}

fn is_well_formed(key: &str, rule: &Rule) -> bool {
    rule.id != 0 && key.parse::<u64>().ok() == Some(rule.id)
}

impl Serialize for RuleMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, rule) in &self.rules {
            if is_well_formed(key, rule) {
                map.serialize_entry(key, rule)?;
            } else if let Some(raw) = self.malformed.get(key) {
                map.serialize_entry(key, raw)?;
            }
        }
        for (key, raw) in &self.malformed {
            if !self.rules.contains_key(key) {
                map.serialize_entry(key, raw)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut map = RuleMap::new();
        for (key, raw) in entries {
            match Rule::deserialize(&raw) {
                Ok(rule) if is_well_formed(&key, &rule) => {
                    map.rules.insert(key, rule);
                }
                _ => {
                    map.malformed.insert(key, raw);
                }
            }
        }
        Ok(map)
    }
}

impl RuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Inserts or replaces the rule under its own id.
    pub fn insert(&mut self, rule: Rule) {
        self.rules.insert(rule.id.to_string(), rule);
    }

    pub fn remove(&mut self, id: u64) -> Option<Rule> {
        self.rules.remove(&id.to_string())
    }

    pub fn get(&self, id: u64) -> Option<&Rule> {
        self.rules.get(&id.to_string())
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Rule> {
        self.rules.get_mut(&id.to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.rules.values_mut()
    }

    /// Rules sorted by numeric id, for display.
    pub fn sorted(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.values().collect();
        rules.sort_by_key(|rule| rule.id);
        rules
    }

    /// Next id to assign: one more than the largest id or key present in the
    /// map, set-aside records included.
    pub fn next_id(&self) -> u64 {
        let max_key = self
            .rules
            .keys()
            .chain(self.malformed.keys())
            .filter_map(|key| key.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let max_id = self.rules.values().map(|rule| rule.id).max().unwrap_or(0);
        max_key.max(max_id) + 1
    }

    /// Adds a live rule for the base origin of `url` under the next free id.
    pub fn add(&mut self, url: &str, threshold: u32) -> Result<u64, RuleError> {
        if !is_valid_url(url) {
            return Err(RuleError::InvalidUrl(url.to_string()));
        }
        let base = base_origin(url);
        if self.find_by_url(&base).is_some() {
            return Err(RuleError::AlreadyExists(base));
        }

        let id = self.next_id();
        self.insert(Rule::new(id, base, threshold));
        Ok(id)
    }

    /// Rule whose base origin equals `base_url`.
    pub fn find_by_url(&self, base_url: &str) -> Option<&Rule> {
        self.rules.values().find(|rule| rule.url == base_url)
    }

    pub fn find_by_url_mut(&mut self, base_url: &str) -> Option<&mut Rule> {
        self.rules.values_mut().find(|rule| rule.url == base_url)
    }

    /// Rule currently owning `tab_id`. Linear scan over every rule's tabs.
    pub fn find_by_tab(&self, tab_id: TabId) -> Option<&Rule> {
        self.rules.values().find(|rule| rule.has_tab(tab_id))
    }

    pub fn find_by_tab_mut(&mut self, tab_id: TabId) -> Option<&mut Rule> {
        self.rules.values_mut().find(|rule| rule.has_tab(tab_id))
    }

    /// Keys of records set aside when the collection was read.
    pub fn malformed_keys(&self) -> Vec<&str> {
        self.malformed.keys().map(String::as_str).collect()
    }

    /// Keys of in-memory rules that cannot be persisted: a zero id, or a map
    /// key that disagrees with the record's id. Saving leaves them out.
    pub fn unsaveable_keys(&self) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|(key, rule)| !is_well_formed(key, rule))
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

impl FromIterator<Rule> for RuleMap {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut map = RuleMap::new();
        for rule in iter {
            map.insert(rule);
        }
        map
    }
}

/// Canonical base origin (`scheme://host[:port]`) of `url`.
///
/// Inputs that do not parse, or whose origin is opaque (`about:blank`,
/// `data:` URLs), are returned unchanged so they can still be compared.
pub fn base_origin(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let origin = parsed.origin();
            if origin.is_tuple() {
                origin.ascii_serialization()
            } else {
                url.to_string()
            }
        }
        Err(_) => url.to_string(),
    }
}

/// True when `url` parses as an absolute http(s) URL with a host.
pub fn is_valid_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.host().is_some())
        .unwrap_or(false)
}
