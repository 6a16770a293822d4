use color_eyre::Result;
use lazy_static::lazy_static;
use poise::serenity_prelude as serenity;
use regex::Regex;
use tracing::{debug, info};

use crate::{bot::JobContext, wisps::xp};

const MAX_NICKNAME_LENGTH: usize = 32;

lazy_static! {
    #[allow(clippy::expect_used)]
    static ref LEVEL_SUFFIX: Regex =
        Regex::new(r"\s*\[Lv \d+\]$").expect("failed to compile level suffix regex");
}

/// `base` with any old level suffix replaced by the one for `level`, cut
/// down to fit in a nickname.
pub fn decorate_nickname(base: &str, level: u32) -> String {
    let suffix = format!(" [Lv {level}]");
    let base = LEVEL_SUFFIX.replace(base, "");
    let base = base.trim();

    let room = MAX_NICKNAME_LENGTH.saturating_sub(suffix.chars().count());
    let base: String = base.chars().take(room).collect();

    format!("{}{suffix}", base.trim_end())
}

/// Outbox consumer: keeps the member's nickname suffix in line with their level.
pub async fn refresh(
    ctx: &JobContext,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<()> {
    let _guard = ctx.locks.lock((guild, user)).await;

    let member = guild.member(&ctx.ctx.http, user).await?;
    if member.user.bot {
        return Ok(());
    }

    let level = xp::level_from_xp(xp::get_total_xp(&ctx.db, guild, user).await?);
    let current = member.nick.as_deref().unwrap_or(&member.user.name);
    let nickname = decorate_nickname(current, level);

    if nickname == current {
        debug!("Nickname of {user} in {guild} is already up to date");
        return Ok(());
    }

    info!("Renaming {user} in {guild} to '{nickname}'");
    guild
        .edit_member(&ctx.ctx.http, user, |edit| edit.nickname(&nickname))
        .await?;

    Ok(())
}
