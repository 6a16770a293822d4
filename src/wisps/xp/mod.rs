pub mod caps;
pub mod commands;
pub mod listeners;

use chrono::NaiveDate;
use color_eyre::Result;
use itertools::Itertools;
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use self::caps::{CapSource, Caps};
use crate::wisps::outbox;

pub const MESSAGE_BUCKET: &str = "message_length";
pub const REACTION_BUCKET: &str = "reactions";
pub const VOICE_BUCKET: &str = "vc_seconds";
/// Pseudo-bucket taking voice seconds through the voice cap into [`VOICE_BUCKET`].
pub const VOICE_INPUT: &str = "vc";

/// XP per unit of each bucket. Buckets not listed count 1:1.
const XP_WEIGHTS: &[(&str, f64)] = &[
    (MESSAGE_BUCKET, 1.0),
    (REACTION_BUCKET, 1.0),
    // one XP per minute in voice
    (VOICE_BUCKET, 1.0 / 60.0),
    ("bump", 25.0),
];

pub fn weight(bucket: &str) -> f64 {
    XP_WEIGHTS
        .iter()
        .find(|(name, _)| *name == bucket)
        .map_or(1.0, |(_, weight)| *weight)
}

pub fn weighted_total<'a>(buckets: impl IntoIterator<Item = (&'a str, f64)>) -> f64 {
    buckets
        .into_iter()
        .map(|(bucket, amount)| amount * weight(bucket))
        .sum()
}

pub fn level_from_xp(xp: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let level = (xp.max(0.0) / 100.0).powf(0.65).floor() as u32;
    level
}

pub fn xp_to_next_level(xp: f64) -> f64 {
    let next_level = f64::from(level_from_xp(xp) + 1);
    let xp_for_next_level = next_level.powf(1.0 / 0.65) * 100.0;
    (xp_for_next_level - xp).max(0.0).ceil()
}

#[instrument(skip(db))]
pub async fn get_total_xp(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<f64> {
    let rows: Vec<(String, f64)> = sqlx::query_as(include_str!("queries/get_activity.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .fetch_all(db)
        .await?;

    Ok(weighted_total(
        rows.iter().map(|(bucket, amount)| (bucket.as_str(), *amount)),
    ))
}

/// Adds `amount` to one of a user's activity buckets and returns how much was
/// counted.
///
/// `"vc"` takes seconds through the voice daily cap into `vc_seconds`; every
/// other bucket is taken as given and never drops below zero.
#[instrument(skip(db, caps))]
pub async fn update_xp(
    db: &SqlitePool,
    caps: &Caps,
    guild: serenity::GuildId,
    user: serenity::UserId,
    amount: f64,
    bucket: &str,
    today: NaiveDate,
) -> Result<f64> {
    if bucket == VOICE_INPUT {
        record(db, guild, user, amount, VOICE_BUCKET, Some((CapSource::Voice, caps)), today).await
    } else {
        record(db, guild, user, amount, bucket, None, today).await
    }
}

/// Like [`update_xp`], but counted against the daily cap of `source` first.
pub async fn update_xp_capped(
    db: &SqlitePool,
    caps: &Caps,
    source: CapSource,
    guild: serenity::GuildId,
    user: serenity::UserId,
    amount: f64,
    bucket: &str,
    today: NaiveDate,
) -> Result<f64> {
    record(db, guild, user, amount, bucket, Some((source, caps)), today).await
}

async fn record(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    amount: f64,
    bucket: &str,
    cap: Option<(CapSource, &Caps)>,
    today: NaiveDate,
) -> Result<f64> {
    if amount == 0.0 || !amount.is_finite() {
        return Ok(0.0);
    }

    let mut tx = db.begin().await?;

    let counted = match cap {
        Some((source, caps)) => {
            caps::clamp(&mut tx, source, caps.limit(source), guild, user, amount, today).await?
        }
        None => amount,
    };
    if counted == 0.0 {
        return Ok(0.0);
    }

    let total: f64 = sqlx::query_scalar(include_str!("queries/add_xp.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(bucket)
        .bind(counted)
        .bind(counted)
        .fetch_one(&mut *tx)
        .await?;

    outbox::emit(&mut tx, guild, user).await?;
    tx.commit().await?;

    debug!("{user} in {guild}: {counted:+} {bucket}, bucket now {total}");

    Ok(counted)
}

/// Users of a guild ordered by total XP, highest first.
pub async fn leaderboard(
    db: &SqlitePool,
    guild: serenity::GuildId,
    limit: usize,
) -> Result<Vec<(serenity::UserId, f64)>> {
    let rows: Vec<(String, String, f64)> =
        sqlx::query_as(include_str!("queries/guild_activity.sql"))
            .bind(guild.to_string())
            .fetch_all(db)
            .await?;

    let mut totals = Vec::new();
    for (user, xp) in rows
        .iter()
        .map(|(user, bucket, amount)| (user.as_str(), amount * weight(bucket)))
        .into_grouping_map()
        .sum()
    {
        totals.push((serenity::UserId(user.parse()?), xp));
    }

    Ok(totals
        .into_iter()
        .sorted_by(|(a_user, a), (b_user, b)| b.total_cmp(a).then(a_user.cmp(b_user)))
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const GUILD: serenity::GuildId = serenity::GuildId(1);
    const USER: serenity::UserId = serenity::UserId(42);
    const CAPS: Caps = Caps {
        voice: 200.0,
        reaction: 5.0,
    };

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 3, 14).unwrap()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    async fn pending_events(db: &SqlitePool) -> i64 {
        sqlx::query_scalar("select count(*) from outbox where delivered_at is null")
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[test]
    fn unknown_buckets_weigh_one() {
        assert_eq!(weight("quiz"), 1.0);
        assert_eq!(weight(VOICE_BUCKET), 1.0 / 60.0);
        assert_close(
            weighted_total([(VOICE_BUCKET, 600.0), (MESSAGE_BUCKET, 5.0), ("quiz", 2.0)]),
            17.0,
        );
    }

    #[test]
    fn levels_grow_sublinearly() {
        assert_eq!(level_from_xp(0.0), 0);
        assert_eq!(level_from_xp(99.0), 0);
        assert_eq!(level_from_xp(150.0), 1);
        assert_eq!(level_from_xp(1000.0), 4);
        assert!(xp_to_next_level(150.0) > 0.0);
        assert_eq!(level_from_xp(150.0 + xp_to_next_level(150.0)), 2);
    }

    #[tokio::test]
    async fn messages_accumulate_into_total_xp() {
        let db = db::memory().await;

        for _ in 0..7 {
            update_xp(&db, &CAPS, GUILD, USER, 10.0, MESSAGE_BUCKET, today())
                .await
                .unwrap();
        }

        assert_eq!(get_total_xp(&db, GUILD, USER).await.unwrap(), 70.0);
    }

    #[tokio::test]
    async fn voice_goes_through_the_daily_cap() {
        let db = db::memory().await;

        let first = update_xp(&db, &CAPS, GUILD, USER, 150.0, VOICE_INPUT, today())
            .await
            .unwrap();
        let second = update_xp(&db, &CAPS, GUILD, USER, 100.0, VOICE_INPUT, today())
            .await
            .unwrap();

        assert_eq!(first, 150.0);
        assert_eq!(second, 50.0);
        assert_close(get_total_xp(&db, GUILD, USER).await.unwrap(), 200.0 / 60.0);

        let tomorrow = today().succ_opt().unwrap();
        let third = update_xp(&db, &CAPS, GUILD, USER, 100.0, VOICE_INPUT, tomorrow)
            .await
            .unwrap();
        assert_eq!(third, 100.0);
    }

    #[tokio::test]
    async fn buckets_are_floored_at_zero() {
        let db = db::memory().await;
        update_xp(&db, &CAPS, GUILD, USER, 5.0, "bump", today())
            .await
            .unwrap();

        update_xp(&db, &CAPS, GUILD, USER, -20.0, "bump", today())
            .await
            .unwrap();

        assert_eq!(get_total_xp(&db, GUILD, USER).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn zero_updates_write_nothing() {
        let db = db::memory().await;

        let counted = update_xp(&db, &CAPS, GUILD, USER, 0.0, MESSAGE_BUCKET, today())
            .await
            .unwrap();

        assert_eq!(counted, 0.0);
        assert_eq!(pending_events(&db).await, 0);
    }

    #[tokio::test]
    async fn updates_queue_one_event_per_consumer() {
        let db = db::memory().await;

        update_xp(&db, &CAPS, GUILD, USER, 3.0, MESSAGE_BUCKET, today())
            .await
            .unwrap();

        assert_eq!(pending_events(&db).await, 2);
    }

    #[tokio::test]
    async fn capped_out_updates_queue_nothing() {
        let db = db::memory().await;
        let react = |amount| {
            update_xp_capped(
                &db,
                &CAPS,
                CapSource::Reaction,
                GUILD,
                USER,
                amount,
                REACTION_BUCKET,
                today(),
            )
        };
        react(5.0).await.unwrap();

        let counted = react(1.0).await.unwrap();

        assert_eq!(counted, 0.0);
        assert_eq!(pending_events(&db).await, 2);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_weighted_total() {
        let db = db::memory().await;
        let other = serenity::UserId(43);
        update_xp(&db, &CAPS, GUILD, USER, 10.0, MESSAGE_BUCKET, today())
            .await
            .unwrap();
        update_xp(&db, &CAPS, GUILD, other, 1.0, "bump", today())
            .await
            .unwrap();

        let board = leaderboard(&db, GUILD, 10).await.unwrap();

        assert_eq!(board, vec![(other, 25.0), (USER, 10.0)]);
    }
}
