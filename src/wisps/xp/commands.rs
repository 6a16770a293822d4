use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;

use super::caps;
use crate::bot::CommandContext;

const LEADERBOARD_LENGTH: usize = 10;

#[poise::command(slash_command, guild_only, subcommands("show", "leaderboard", "grant"))]
#[allow(clippy::unused_async)]
pub async fn xp(_ctx: CommandContext<'_>) -> Result<()> {
    Ok(())
}

/// Show a user's XP and level.
#[poise::command(slash_command, guild_only)]
pub async fn show(
    ctx: CommandContext<'_>,
    #[description = "The user to look up (defaults to you)"] user: Option<serenity::User>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;
    let user_id = user.map_or_else(|| ctx.author().id, |u| u.id);

    let total = super::get_total_xp(&ctx.data().db, guild, user_id).await?;
    let level = super::level_from_xp(total);

    ctx.say(format!(
        "{} has {:.0} XP and is level {level}, {:.0} XP away from level {}.",
        serenity::Mention::from(user_id),
        total.floor(),
        super::xp_to_next_level(total),
        level + 1
    ))
    .await?;

    Ok(())
}

/// Show the members with the most XP.
#[poise::command(slash_command, guild_only)]
pub async fn leaderboard(ctx: CommandContext<'_>) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let board = super::leaderboard(&ctx.data().db, guild, LEADERBOARD_LENGTH).await?;

    let response = if board.is_empty() {
        "Nobody has earned any XP yet. :zzz:".to_owned()
    } else {
        let lines: Vec<String> = board
            .into_iter()
            .enumerate()
            .map(|(rank, (user, total))| {
                format!(
                    "{}. {} {:.0} XP (level {})",
                    rank + 1,
                    serenity::Mention::from(user),
                    total.floor(),
                    super::level_from_xp(total)
                )
            })
            .collect();
        format!(":trophy: XP leaderboard\n{}", lines.join("\n"))
    };

    ctx.say(response).await?;

    Ok(())
}

/// Add to or take from one of a user's activity buckets.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn grant(
    ctx: CommandContext<'_>,
    #[description = "The user to adjust"] user: serenity::User,
    #[description = "Activity bucket, e.g. bump or message_length"] bucket: String,
    #[description = "Amount to add; negative to take"] amount: f64,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let counted = super::update_xp(
        &ctx.data().db,
        &ctx.data().caps,
        guild,
        user.id,
        amount,
        bucket.trim(),
        caps::today(),
    )
    .await?;
    let total = super::get_total_xp(&ctx.data().db, guild, user.id).await?;

    ctx.say(format!(
        "Counted {counted:+} {} for {}; they now have {:.0} XP.",
        bucket.trim(),
        serenity::Mention::from(user.id),
        total.floor()
    ))
    .await?;

    Ok(())
}
