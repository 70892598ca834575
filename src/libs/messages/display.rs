//! Text for every [`Message`] variant.

use super::types::Message;
use std::fmt;

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            // === RULE MESSAGES ===
            Message::RuleAdded(id, url) => format!("Rule {} added for {}", id, url),
            Message::RuleRemoved(id) => format!("Rule {} removed", id),
            Message::RuleNotFound(id) => format!("Rule with ID {} not found", id),
            Message::RuleAlreadyExists(url) => format!("A rule for {} already exists", url),
            Message::InvalidRuleUrl(url) => format!("'{}' is not a valid http(s) URL", url),
            Message::RulesEmpty => "No rules configured yet. Add one with `tabquota rule add <url>`".to_string(),
            Message::RulesHeader => "Rules:".to_string(),
            Message::ConfirmRemoveRule(url) => format!("Remove the rule for {}?", url),
            Message::OperationCancelled => "Operation cancelled".to_string(),

            // === USAGE MESSAGES ===
            Message::UsageHeader => "Usage today:".to_string(),

            // === RESET MESSAGES ===
            Message::DailyResetApplied(count) => format!("Daily budgets reset for {} rule(s)", count),
            Message::CatchUpResetApplied(count) => format!("Applied a missed daily reset to {} rule(s)", count),

            // === CONFIG MESSAGES ===
            Message::ConfigSaved => "Configuration saved".to_string(),
            Message::ConfigDeleted => "Configuration removed".to_string(),
            Message::ConfigEngineHeader => "Engine settings".to_string(),
            Message::PromptSweepInterval => "Sweep interval (seconds)".to_string(),
            Message::PromptRedirectUrl => "Redirect blocked tabs to".to_string(),
            Message::PromptResponseTimeout => "Browser response timeout (milliseconds)".to_string(),
            Message::InvalidRedirectUrl(url) => format!("'{}' is not a valid http(s) URL", url),

            // === MANIFEST MESSAGES ===
            Message::InvalidExtensionId(id) => format!("'{}' is not a valid extension ID", id),

            // === HOST MESSAGES ===
            Message::HostStarted(key) => format!("Native host started (storage key: {})", key),
            Message::HostExitedNormally => "Native host exited normally".to_string(),
            Message::HostError(e) => format!("Native host error: {}", e),
            Message::HostShuttingDown => "Shutting down native host".to_string(),
            Message::WatcherReceivedSigterm => "Received SIGTERM".to_string(),
            Message::WatcherReceivedSigint => "Received SIGINT".to_string(),
            Message::WatcherReceivedCtrlC => "Received Ctrl+C".to_string(),
            Message::WatcherCtrlCListenFailed(e) => format!("Failed to listen for Ctrl+C: {}", e),
            Message::SignalHandlerFailed(e) => format!("Failed to install signal handler: {}", e),

            // === MIGRATION MESSAGES ===
            Message::MigrationsFound(count) => format!("Found {} pending migration(s)", count),
            Message::RunningMigration(version, name) => format!("Running migration v{}: {}", version, name),
            Message::MigrationCompleted(version) => format!("Migration v{} completed", version),
            Message::MigrationFailed(version, e) => format!("Migration v{} failed: {}", version, e),
            Message::AllMigrationsCompleted => "All migrations completed".to_string(),
        };
        write!(f, "{}", s)
    }
}
