use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;

use super::{Currency, LedgerUpdate, Transfer};
use crate::bot::CommandContext;

const HISTORY_LENGTH: i64 = 10;

#[poise::command(
    slash_command,
    guild_only,
    subcommands("balance", "pay", "grant", "history")
)]
#[allow(clippy::unused_async)]
pub async fn economy(_ctx: CommandContext<'_>) -> Result<()> {
    Ok(())
}

/// Show a user's balances.
#[poise::command(slash_command, guild_only)]
pub async fn balance(
    ctx: CommandContext<'_>,
    #[description = "The user to look up (defaults to you)"] user: Option<serenity::User>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;
    let user_id = user.map_or_else(|| ctx.author().id, |u| u.id);

    let lines: Vec<String> = super::balances(&ctx.data().db, guild, user_id)
        .await?
        .into_iter()
        .map(|(currency, amount)| format!("{} {amount} {}s", currency.emoji(), currency.key()))
        .collect();

    ctx.say(format!(
        "{}'s balance:\n{}",
        serenity::Mention::from(user_id),
        lines.join("\n")
    ))
    .await?;

    Ok(())
}

/// Send some of your currency to another user.
#[poise::command(slash_command, guild_only)]
pub async fn pay(
    ctx: CommandContext<'_>,
    #[description = "Who to pay"] user: serenity::User,
    #[description = "Which currency to send"] currency: Currency,
    #[description = "How much to send"]
    #[min = 1]
    amount: i64,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    if user.bot {
        ctx.say("Bots have no use for money. :robot:").await?;
        return Ok(());
    }

    let reason = format!("transfer from {}", ctx.author().id);
    let outcome = super::transfer(
        &ctx.data().db,
        guild,
        ctx.author().id,
        user.id,
        currency,
        amount,
        &reason,
    )
    .await?;

    let response = match outcome {
        Transfer::Completed { from_balance, .. } => format!(
            "Sent {amount} {}s to {}. You have {from_balance} left. {}",
            currency.key(),
            serenity::Mention::from(user.id),
            currency.emoji()
        ),
        Transfer::Insufficient { balance } => format!(
            "You only have {balance} {}s. :money_with_wings:",
            currency.key()
        ),
        Transfer::Invalid => "You can't send that. :thinking:".to_owned(),
    };

    ctx.say(response).await?;

    Ok(())
}

/// Add to or take from a user's balance.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn grant(
    ctx: CommandContext<'_>,
    #[description = "The user to adjust"] user: serenity::User,
    #[description = "Which currency to adjust"] currency: Currency,
    #[description = "Amount to add; negative to take"] amount: i64,
    #[description = "Why (kept in the audit log)"] reason: Option<String>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;
    let reason = reason.unwrap_or_else(|| format!("grant by {}", ctx.author().id));

    let outcome = super::update(&ctx.data().db, guild, user.id, currency, amount, &reason).await?;

    let response = match outcome {
        LedgerUpdate::NoOp => "Nothing to do.".to_owned(),
        LedgerUpdate::Applied(balance) => format!(
            "{} now has {balance} {}s.",
            serenity::Mention::from(user.id),
            currency.key()
        ),
        LedgerUpdate::Rejected { balance } => format!(
            "{} only has {balance} {}s; balances can't go negative.",
            serenity::Mention::from(user.id),
            currency.key()
        ),
    };

    ctx.say(response).await?;

    Ok(())
}

/// Show the most recent changes to a user's balances.
#[poise::command(slash_command, guild_only)]
pub async fn history(
    ctx: CommandContext<'_>,
    #[description = "The user to look up (defaults to you)"] user: Option<serenity::User>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;
    let user_id = user.map_or_else(|| ctx.author().id, |u| u.id);

    let entries = super::history(&ctx.data().db, guild, user_id, HISTORY_LENGTH).await?;

    let response = if entries.is_empty() {
        format!(
            "{} has no transactions yet.",
            serenity::Mention::from(user_id)
        )
    } else {
        let lines: Vec<String> = entries
            .into_iter()
            .map(|entry| {
                let emoji = Currency::from_key(&entry.currency).map_or("", Currency::emoji);
                format!(
                    "<t:{}:R> {emoji} {:+} → {} ({})",
                    entry.created_at, entry.delta, entry.balance, entry.reason
                )
            })
            .collect();
        format!(
            "Recent transactions for {}:\n{}",
            serenity::Mention::from(user_id),
            lines.join("\n")
        )
    };

    ctx.say(response).await?;

    Ok(())
}
