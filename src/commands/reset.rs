use super::open_rule_store;
use crate::{
    libs::{clock::SystemClock, messages::Message, reset::DailyReset},
    msg_success,
};
use anyhow::Result;
use std::sync::Arc;

/// Starts a fresh daily budget for every rule without waiting for midnight.
pub async fn cmd() -> Result<()> {
    let reset = DailyReset::new(open_rule_store()?, Arc::new(SystemClock));
    let count = reset.run().await?;
    msg_success!(Message::DailyResetApplied(count));
    Ok(())
}
