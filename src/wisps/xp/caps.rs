use chrono::NaiveDate;
use color_eyre::Result;
use poise::serenity_prelude as serenity;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::config;

/// Activities whose contribution is limited per user per calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapSource {
    Voice,
    Reaction,
}

impl CapSource {
    const fn key(self) -> &'static str {
        match self {
            CapSource::Voice => "voice",
            CapSource::Reaction => "reaction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Caps {
    pub voice: f64,
    pub reaction: f64,
}

impl Caps {
    pub fn from_env() -> Self {
        Self {
            voice: config::voice_daily_cap(),
            reaction: config::reaction_daily_cap(),
        }
    }

    pub const fn limit(&self, source: CapSource) -> f64 {
        match source {
            CapSource::Voice => self.voice,
            CapSource::Reaction => self.reaction,
        }
    }
}

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Counts `requested` against today's allowance for `source` and returns how
/// much of it may be applied.
///
/// Runs on the caller's connection so the counter and whatever it guards
/// commit together.
pub async fn clamp(
    conn: &mut SqliteConnection,
    source: CapSource,
    cap: f64,
    guild: serenity::GuildId,
    user: serenity::UserId,
    requested: f64,
    today: NaiveDate,
) -> Result<f64> {
    if requested <= 0.0 {
        return Ok(0.0);
    }

    let row: Option<(String, f64)> = sqlx::query_as(include_str!("queries/get_cap.sql"))
        .bind(source.key())
        .bind(guild.to_string())
        .bind(user.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    let gained = match row {
        Some((day, gained)) if day.parse::<NaiveDate>().ok() == Some(today) => gained,
        Some((day, _)) => {
            debug!("Resetting {} cap for {user} in {guild} (last counted {day})", source.key());
            0.0
        }
        None => 0.0,
    };

    let applied = allowance(cap, gained, requested);
    if applied <= 0.0 {
        debug!(
            "{user} in {guild} hit the daily {} cap ({cap}); discarding {requested}",
            source.key()
        );
        return Ok(0.0);
    }

    sqlx::query(include_str!("queries/put_cap.sql"))
        .bind(source.key())
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(today.to_string())
        .bind(gained + applied)
        .execute(&mut *conn)
        .await?;

    Ok(applied)
}

fn allowance(cap: f64, gained: f64, requested: f64) -> f64 {
    let remaining = (cap - gained).max(0.0);
    requested.min(remaining)
}

/// Drops counters from before `today`; they would be reset on next use anyway.
pub async fn prune(db: &SqlitePool, today: NaiveDate) -> Result<u64> {
    let result = sqlx::query(include_str!("queries/prune_caps.sql"))
        .bind(today.to_string())
        .execute(db)
        .await?;

    Ok(result.rows_affected())
}
