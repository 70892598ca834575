//! Narrow interface to the browser: tab lookup and the redirect actuator.

use crate::libs::rule::TabId;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrowserError {
    #[error("tab {0} does not exist")]
    NotFound(TabId),

    #[error("browser request failed: {0}")]
    Other(String),

    #[error("browser connection closed")]
    Disconnected,

    #[error("browser did not answer within {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub url: String,
}

#[async_trait]
pub trait Browser: Send + Sync {
    /// Current URL of a tab.
    async fn get_tab_info(&self, tab_id: TabId) -> Result<TabInfo, BrowserError>;

    /// Navigates a tab to `url`.
    async fn navigate(&self, tab_id: TabId, url: &str) -> Result<(), BrowserError>;
}

/// Sends tabs of expired rules to a fixed neutral page.
#[derive(Clone)]
pub struct Redirector {
    browser: Arc<dyn Browser>,
    destination: String,
}

impl Redirector {
    pub fn new(browser: Arc<dyn Browser>, destination: impl Into<String>) -> Self {
        Self {
            browser,
            destination: destination.into(),
        }
    }

    /// Fire-and-forget: a failed redirect is logged and the next sweep reconciles.
    pub async fn redirect(&self, tab_id: TabId) {
        match self.browser.navigate(tab_id, &self.destination).await {
            Ok(()) => info!(tab_id, destination = %self.destination, "tab redirected"),
            Err(BrowserError::NotFound(_)) => warn!(tab_id, "tab vanished before it could be redirected"),
            Err(e) => warn!(tab_id, error = %e, "failed to redirect tab"),
        }
    }

    pub async fn redirect_all(&self, tab_ids: &[TabId]) {
        for tab_id in tab_ids {
            self.redirect(*tab_id).await;
        }
    }
}
