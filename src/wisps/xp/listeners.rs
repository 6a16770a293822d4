use chrono::NaiveDate;
use color_eyre::Result;
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::caps::{self, CapSource, Caps};
use crate::bot::Bot;

/// Characters per XP point for messages.
const CHARS_PER_XP: f64 = 20.0;
const MAX_MESSAGE_XP: f64 = 10.0;
const REACTION_XP: f64 = 1.0;

pub fn message_xp(content: &str) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let chars = content.trim().chars().count() as f64;
    (chars / CHARS_PER_XP).min(MAX_MESSAGE_XP)
}

pub async fn on_message(bot: &Bot, message: &serenity::Message) -> Result<()> {
    if message.author.bot {
        return Ok(());
    }
    let Some(guild) = message.guild_id else {
        return Ok(());
    };

    super::update_xp(
        &bot.db,
        &bot.caps,
        guild,
        message.author.id,
        message_xp(&message.content),
        super::MESSAGE_BUCKET,
        caps::today(),
    )
    .await?;

    Ok(())
}

pub async fn on_reaction_add(
    ctx: &serenity::Context,
    bot: &Bot,
    reaction: &serenity::Reaction,
) -> Result<()> {
    let (Some(guild), Some(user_id)) = (reaction.guild_id, reaction.user_id) else {
        return Ok(());
    };
    if user_id.to_user(ctx).await?.bot {
        return Ok(());
    }

    count_reaction(&bot.db, &bot.caps, guild, user_id, caps::today()).await?;

    Ok(())
}

async fn count_reaction(
    db: &SqlitePool,
    caps: &Caps,
    guild: serenity::GuildId,
    user: serenity::UserId,
    today: NaiveDate,
) -> Result<f64> {
    super::update_xp_capped(
        db,
        caps,
        CapSource::Reaction,
        guild,
        user,
        REACTION_XP,
        super::REACTION_BUCKET,
        today,
    )
    .await
}

/// Opens a voice session when a member joins a channel and turns it into
/// voice XP when they leave. Moving between channels keeps the session.
pub async fn on_voice_state_update(bot: &Bot, new: &serenity::VoiceState) -> Result<()> {
    let Some(guild) = new.guild_id else {
        return Ok(());
    };
    if new.member.as_ref().map_or(false, |member| member.user.bot) {
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();

    if new.channel_id.is_some() {
        open_session(&bot.db, guild, new.user_id, now).await?;
    } else {
        end_session(&bot.db, &bot.caps, guild, new.user_id, now, caps::today()).await?;
    }

    Ok(())
}

/// Brings stored voice sessions in line with who is actually in voice, as
/// seen in the cache once it is ready.
///
/// Sessions of members who left while the bot was away are dropped without
/// credit. Members already in a channel get a session starting now.
pub async fn on_cache_ready(
    ctx: &serenity::Context,
    bot: &Bot,
    guilds: &[serenity::GuildId],
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    for guild_id in guilds {
        let Some(guild) = guild_id.to_guild_cached(&ctx.cache) else {
            warn!("Guild {guild_id} missing from cache, skipping voice sessions");
            continue;
        };

        let in_voice: Vec<serenity::UserId> = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id.is_some())
            .filter(|state| !state.member.as_ref().map_or(false, |member| member.user.bot))
            .map(|state| state.user_id)
            .collect();

        reconcile_sessions(&bot.db, *guild_id, &in_voice, now).await?;
    }

    Ok(())
}

async fn reconcile_sessions(
    db: &SqlitePool,
    guild: serenity::GuildId,
    in_voice: &[serenity::UserId],
    now: i64,
) -> Result<()> {
    let mut tx = db.begin().await?;

    let open: Vec<String> = sqlx::query_scalar(include_str!("queries/guild_voice_sessions.sql"))
        .bind(guild.to_string())
        .fetch_all(&mut *tx)
        .await?;

    let mut dropped = 0;
    for user in open {
        if in_voice.iter().any(|member| member.to_string() == user) {
            continue;
        }
        sqlx::query(include_str!("queries/close_voice_session.sql"))
            .bind(guild.to_string())
            .bind(&user)
            .execute(&mut *tx)
            .await?;
        dropped += 1;
    }

    for user in in_voice {
        sqlx::query(include_str!("queries/open_voice_session.sql"))
            .bind(guild.to_string())
            .bind(user.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    info!(
        "Voice sessions in {guild}: dropped {dropped} stale, {} members in voice",
        in_voice.len()
    );

    Ok(())
}

/// Closes the member's session and credits the time spent. Returns the seconds
/// counted, or `None` if there was no session.
async fn end_session(
    db: &SqlitePool,
    caps: &Caps,
    guild: serenity::GuildId,
    user: serenity::UserId,
    now: i64,
    today: NaiveDate,
) -> Result<Option<f64>> {
    let Some(joined_at) = close_session(db, guild, user).await? else {
        debug!("{user} left voice in {guild} without an open session");
        return Ok(None);
    };

    let seconds = session_seconds(joined_at, now);
    info!("{user} spent {seconds}s in voice in {guild}");

    let counted =
        super::update_xp(db, caps, guild, user, seconds, super::VOICE_INPUT, today).await?;
    Ok(Some(counted))
}

fn session_seconds(joined_at: i64, left_at: i64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let seconds = (left_at - joined_at).max(0) as f64;
    seconds
}

async fn open_session(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    now: i64,
) -> Result<()> {
    sqlx::query(include_str!("queries/open_voice_session.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(now)
        .execute(db)
        .await?;
    Ok(())
}

async fn close_session(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<Option<i64>> {
    let joined_at = sqlx::query_scalar(include_str!("queries/close_voice_session.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .fetch_optional(db)
        .await?;
    Ok(joined_at)
}
