use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;

use super::{Reward, Tier};
use crate::{bot::CommandContext, wisps::outbox};

#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES",
    subcommands("add", "remove", "list", "newcomer", "sync")
)]
#[allow(clippy::unused_async)]
pub async fn tier(_ctx: CommandContext<'_>) -> Result<()> {
    Ok(())
}

/// Add a tier role, or change an existing one.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn add(
    ctx: CommandContext<'_>,
    #[description = "The role members get"] role: serenity::Role,
    #[description = "XP needed for this tier"] min_xp: f64,
    #[description = "Upper XP bound, shown in the tier list only"] max_xp: Option<f64>,
    #[description = "Coins paid on reaching this tier"] coins: Option<i64>,
    #[description = "Orbs paid on reaching this tier"] orbs: Option<i64>,
    #[description = "Stars paid on reaching this tier"] stars: Option<i64>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let reward = Reward {
        coins: coins.unwrap_or(0),
        orbs: orbs.unwrap_or(0),
        stars: stars.unwrap_or(0),
    };
    if min_xp < 0.0 || reward.coins < 0 || reward.orbs < 0 || reward.stars < 0 {
        ctx.say("Thresholds and rewards can't be negative. :thinking:")
            .await?;
        return Ok(());
    }
    if max_xp.map_or(false, |max_xp| max_xp < min_xp) {
        ctx.say("The upper bound has to be above the threshold. :thinking:")
            .await?;
        return Ok(());
    }

    let tier = Tier {
        role: role.id,
        min_xp,
        max_xp,
        reward,
    };
    super::save(&ctx.data().db, guild, &tier).await?;

    ctx.say(format!(
        "{} is now a tier at {min_xp} XP. :medal:",
        serenity::Mention::from(role.id)
    ))
    .await?;

    Ok(())
}

/// Stop treating a role as a tier.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn remove(
    ctx: CommandContext<'_>,
    #[description = "The tier role to remove"] role: serenity::Role,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let response = if super::remove(&ctx.data().db, guild, role.id).await? {
        format!("{} is no longer a tier.", serenity::Mention::from(role.id))
    } else {
        format!("{} wasn't a tier.", serenity::Mention::from(role.id))
    };

    ctx.say(response).await?;

    Ok(())
}

fn describe(index: usize, tier: &Tier) -> String {
    let range = match tier.max_xp {
        Some(max_xp) => format!("{}-{max_xp} XP", tier.min_xp),
        None => format!("{}+ XP", tier.min_xp),
    };

    let rewards: Vec<String> = tier
        .reward
        .amounts()
        .into_iter()
        .filter(|(_, amount)| *amount > 0)
        .map(|(currency, amount)| format!("{amount} {}", currency.emoji()))
        .collect();

    if rewards.is_empty() {
        format!("{}. {} {range}", index + 1, serenity::Mention::from(tier.role))
    } else {
        format!(
            "{}. {} {range}, pays {}",
            index + 1,
            serenity::Mention::from(tier.role),
            rewards.join(" ")
        )
    }
}

/// List this server's tiers.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn list(ctx: CommandContext<'_>) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let tiers = super::list(&ctx.data().db, guild).await?;
    let newcomer = super::newcomer_role(&ctx.data().db, guild).await?;

    let mut lines: Vec<String> = tiers
        .iter()
        .enumerate()
        .map(|(index, tier)| describe(index, tier))
        .collect();
    if lines.is_empty() {
        lines.push("No tiers set up yet.".to_owned());
    }
    if let Some(role) = newcomer {
        lines.push(format!(
            "New members keep {} until their first tier.",
            serenity::Mention::from(role)
        ));
    }

    ctx.say(lines.join("\n")).await?;

    Ok(())
}

/// Set or clear the role that is taken away on reaching the first tier.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn newcomer(
    ctx: CommandContext<'_>,
    #[description = "The newcomer role (leave empty to clear)"] role: Option<serenity::Role>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;

    let role = role.map(|role| role.id);
    super::set_newcomer_role(&ctx.data().db, guild, role).await?;

    let response = match role {
        Some(role) => format!("{} is now the newcomer role.", serenity::Mention::from(role)),
        None => "Cleared the newcomer role.".to_owned(),
    };
    ctx.say(response).await?;

    Ok(())
}

/// Re-check a user's tier role.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_ROLES")]
pub async fn sync(
    ctx: CommandContext<'_>,
    #[description = "The user to re-check (defaults to you)"] user: Option<serenity::User>,
) -> Result<()> {
    let guild = ctx.guild_id().ok_or(eyre!("Command run without guild"))?;
    let user_id = user.map_or_else(|| ctx.author().id, |u| u.id);

    {
        let mut conn = ctx.data().db.acquire().await?;
        outbox::emit(&mut conn, guild, user_id).await?;
    }

    ctx.say(format!(
        "Queued a tier check for {}. :arrows_counterclockwise:",
        serenity::Mention::from(user_id)
    ))
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_described_with_their_rewards() {
        let tier = Tier {
            role: serenity::RoleId(7),
            min_xp: 50.0,
            max_xp: Some(99.0),
            reward: Reward {
                coins: 10,
                orbs: 0,
                stars: 1,
            },
        };

        assert_eq!(describe(0, &tier), "1. <@&7> 50-99 XP, pays 10 :coin: 1 :star:");
    }

    #[test]
    fn open_ended_tiers_without_rewards() {
        let tier = Tier {
            role: serenity::RoleId(8),
            min_xp: 200.0,
            max_xp: None,
            reward: Reward::default(),
        };

        assert_eq!(describe(2, &tier), "3. <@&8> 200+ XP");
    }
}
