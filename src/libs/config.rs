//! Persistent settings for the native host and CLI.
//!
//! Settings live in `config.json` inside the application data directory. A
//! missing file means defaults; `tabquota init` walks through the values
//! interactively and writes the file.
//!
//! ```rust,no_run
//! use tabquota::libs::config::Config;
//!
//! let engine = Config::read()?.engine.unwrap_or_default();
//! println!("sweeping every {:?}", engine.sweep_interval());
//! # Ok::<(), anyhow::Error>(())
//! ```

use super::data_storage::DataStorage;
use crate::libs::messages::Message;
use crate::libs::rule::is_valid_url;
use crate::libs::store::DEFAULT_STORAGE_KEY;
use crate::msg_print;
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Input};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_REDIRECT_URL: &str = "https://example.com/";
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Tunables for the enforcement engine.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds between expiry sweeps.
    pub sweep_interval_secs: u64,
    /// Where tabs of an expired rule are sent.
    pub redirect_url: String,
    /// Key under which the rule map is stored.
    pub storage_key: String,
    /// How long to wait for the extension to answer a tab query or navigation.
    pub response_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            redirect_url: DEFAULT_REDIRECT_URL.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.max(1))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,
}

impl Config {
    pub fn read() -> Result<Config> {
        let config_file_path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        if !config_file_path.exists() {
            return Ok(Config::default());
        }

        let config_str = fs::read_to_string(config_file_path)?;
        let config: Config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_file_path = DataStorage::new().get_path(CONFIG_FILE_NAME)?;
        let config_file = File::create(config_file_path)?;
        serde_json::to_writer_pretty(&config_file, &self)?;
        Ok(())
    }

    /// Prompts for every engine setting, offering the current values as defaults.
    pub fn init() -> Result<Self> {
        let mut config = Self::read().unwrap_or_default();
        let default = config.engine.clone().unwrap_or_default();

        msg_print!(Message::ConfigEngineHeader);
        let theme = ColorfulTheme::default();
        config.engine = Some(EngineConfig {
            sweep_interval_secs: Input::with_theme(&theme)
                .with_prompt(Message::PromptSweepInterval.to_string())
                .default(default.sweep_interval_secs)
                .validate_with(|secs: &u64| if *secs > 0 { Ok(()) } else { Err("must be at least 1") })
                .interact_text()?,
            redirect_url: Input::with_theme(&theme)
                .with_prompt(Message::PromptRedirectUrl.to_string())
                .default(default.redirect_url)
                .validate_with(|url: &String| {
                    if is_valid_url(url) {
                        Ok(())
                    } else {
                        Err(Message::InvalidRedirectUrl(url.clone()).to_string())
                    }
                })
                .interact_text()?,
            storage_key: default.storage_key,
            response_timeout_ms: Input::with_theme(&theme)
                .with_prompt(Message::PromptResponseTimeout.to_string())
                .default(default.response_timeout_ms)
                .interact_text()?,
        });

        Ok(config)
    }
}
