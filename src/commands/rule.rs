use super::open_rule_store;
use crate::{
    libs::{
        messages::Message,
        rule::{base_origin, RuleError, DEFAULT_THRESHOLD_MINUTES},
        view::View,
    },
    msg_error, msg_info, msg_print, msg_success,
};
use anyhow::Result;
use clap::{Args, Subcommand};
use dialoguer::{theme::ColorfulTheme, Confirm};

#[derive(Debug, Args)]
pub struct RuleArgs {
    #[command(subcommand)]
    command: RuleCommand,
}

#[derive(Debug, Subcommand)]
enum RuleCommand {
    /// Limit daily time on the domain of URL
    Add {
        url: String,
        /// Daily budget in minutes
        #[arg(short, long, default_value_t = DEFAULT_THRESHOLD_MINUTES)]
        threshold: u32,
    },
    /// Delete a rule by ID
    Remove {
        id: u64,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show all rules
    List,
}

pub async fn cmd(args: RuleArgs) -> Result<()> {
    match args.command {
        RuleCommand::Add { url, threshold } => handle_add(url, threshold).await,
        RuleCommand::Remove { id, yes } => handle_remove(id, yes).await,
        RuleCommand::List => handle_list().await,
    }
}

async fn handle_add(url: String, threshold: u32) -> Result<()> {
    let base = base_origin(&url);
    let added = open_rule_store()?.update(move |rules| rules.add(&url, threshold)).await?;

    match added {
        Ok(id) => msg_success!(Message::RuleAdded(id, base)),
        Err(RuleError::InvalidUrl(url)) => msg_error!(Message::InvalidRuleUrl(url)),
        Err(RuleError::AlreadyExists(base)) => msg_error!(Message::RuleAlreadyExists(base)),
    }
    Ok(())
}

async fn handle_remove(id: u64, yes: bool) -> Result<()> {
    let store = open_rule_store()?;

    let rule = match store.read().await?.get(id) {
        Some(rule) => rule.clone(),
        None => {
            msg_error!(Message::RuleNotFound(id));
            return Ok(());
        }
    };

    let confirmed = yes
        || Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(Message::ConfirmRemoveRule(rule.url).to_string())
            .default(false)
            .interact()?;

    if !confirmed {
        msg_info!(Message::OperationCancelled);
        return Ok(());
    }

    if store.update(move |rules| rules.remove(id).is_some()).await? {
        msg_success!(Message::RuleRemoved(id));
    } else {
        msg_error!(Message::RuleNotFound(id));
    }
    Ok(())
}

async fn handle_list() -> Result<()> {
    let rules = open_rule_store()?.read().await?;

    if rules.is_empty() {
        msg_info!(Message::RulesEmpty);
        return Ok(());
    }

    msg_print!(Message::RulesHeader, true);
    View::rules(&rules.sorted());
    Ok(())
}
