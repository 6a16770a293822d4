use std::{env, fmt::Display, str::FromStr};

use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude::GuildId;
use tracing::{info, instrument, warn};

pub fn discord_token() -> Result<String> {
    env::var("DISCORD_TOKEN").map_err(|_| eyre!("$DISCORD_TOKEN not set"))
}

pub fn database_path() -> String {
    env::var("DATABASE_PATH").unwrap_or_else(|_| "ledgerbot.db".to_owned())
}

#[instrument]
pub fn testing_guild() -> Option<GuildId> {
    let guild_id = match env::var("TESTING_GUILD") {
        Ok(guild_id) => guild_id,
        Err(e) => {
            info!("$TESTING_GUILD not set ({e})");
            return None;
        }
    };

    match guild_id.parse::<u64>() {
        Ok(guild_id) => Some(GuildId(guild_id)),
        Err(e) => {
            warn!("Ignoring $TESTING_GUILD: {e}");
            None
        }
    }
}

/// Reads `name` and parses it, falling back to `default` when it is unset or invalid.
fn parsed_or<T>(name: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value.parse().unwrap_or_else(|e| {
            warn!("Ignoring ${name}: {e}");
            default
        }),
        Err(_) => default,
    }
}

pub fn outbox_dispatch_schedule() -> String {
    env::var("OUTBOX_DISPATCH_SCHEDULE").unwrap_or_else(|_| "*/5 * * * * *".to_owned())
}

pub fn housekeeping_schedule() -> String {
    env::var("HOUSEKEEPING_SCHEDULE").unwrap_or_else(|_| "0 0 * * * *".to_owned())
}

pub fn outbox_max_attempts() -> i64 {
    parsed_or("OUTBOX_MAX_ATTEMPTS", 5)
}

/// Voice seconds counted towards XP per user per calendar day.
pub fn voice_daily_cap() -> f64 {
    parsed_or("VOICE_DAILY_CAP", 7200.0)
}

/// Reaction XP counted per user per calendar day.
pub fn reaction_daily_cap() -> f64 {
    parsed_or("REACTION_DAILY_CAP", 50.0)
}

pub fn daily_base_reward() -> i64 {
    parsed_or("DAILY_BASE_REWARD", 100)
}

pub fn daily_streak_bonus() -> i64 {
    parsed_or("DAILY_STREAK_BONUS", 10)
}

pub fn daily_streak_max() -> i64 {
    parsed_or("DAILY_STREAK_MAX", 30)
}
