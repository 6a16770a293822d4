use color_eyre::{eyre::eyre, Result};

use super::DailyClaim;
use crate::{bot::CommandContext, wisps::xp::caps};

/// Claim your daily coins.
#[poise::command(slash_command, guild_only)]
pub async fn daily(ctx: CommandContext<'_>) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let outcome = super::claim(
        &ctx.data().db,
        &ctx.data().daily,
        guild,
        ctx.author().id,
        caps::today(),
    )
    .await?;

    let response = match outcome {
        DailyClaim::Claimed {
            streak: 1,
            reward,
            balance,
        } => format!("Here's {reward} coins! You now have {balance}. :coin:"),
        DailyClaim::Claimed {
            streak,
            reward,
            balance,
        } => format!(
            "Day {streak} in a row! Here's {reward} coins, you now have {balance}. :fire:"
        ),
        DailyClaim::AlreadyClaimed { streak } => format!(
            "You've already claimed today. \
             Come back tomorrow to keep your {streak} day streak going! :hourglass:"
        ),
    };

    ctx.say(response).await?;

    Ok(())
}
