/// Every user-facing message, grouped by the command or subsystem that emits it.
///
/// Text lives in `display.rs`; call sites only pick the variant.
#[derive(Debug, Clone)]
pub enum Message {
    // === RULE MESSAGES ===
    RuleAdded(u64, String),
    RuleRemoved(u64),
    RuleNotFound(u64),
    RuleAlreadyExists(String),
    InvalidRuleUrl(String),
    RulesEmpty,
    RulesHeader,
    ConfirmRemoveRule(String),
    OperationCancelled,

    // === USAGE MESSAGES ===
    UsageHeader,

    // === RESET MESSAGES ===
    DailyResetApplied(usize),
    CatchUpResetApplied(usize),

    // === CONFIG MESSAGES ===
    ConfigSaved,
    ConfigDeleted,
    ConfigEngineHeader,
    PromptSweepInterval,
    PromptRedirectUrl,
    PromptResponseTimeout,
    InvalidRedirectUrl(String),

    // === MANIFEST MESSAGES ===
    InvalidExtensionId(String),

    // === HOST MESSAGES ===
    HostStarted(String),
    HostExitedNormally,
    HostError(String),
    HostShuttingDown,
    WatcherReceivedSigterm,
    WatcherReceivedSigint,
    WatcherReceivedCtrlC,
    WatcherCtrlCListenFailed(String),
    SignalHandlerFailed(String),

    // === MIGRATION MESSAGES ===
    MigrationsFound(usize),
    RunningMigration(u32, String),
    MigrationCompleted(u32),
    MigrationFailed(u32, String),
    AllMigrationsCompleted,
}
