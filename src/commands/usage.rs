use super::open_rule_store;
use crate::{
    libs::{clock::Clock, clock::SystemClock, messages::Message, view::View},
    msg_info, msg_print,
};
use anyhow::Result;

pub async fn cmd() -> Result<()> {
    let rules = open_rule_store()?.read().await?;

    if rules.is_empty() {
        msg_info!(Message::RulesEmpty);
        return Ok(());
    }

    msg_print!(Message::UsageHeader, true);
    View::usage(&rules.sorted(), SystemClock.now_millis());
    Ok(())
}
