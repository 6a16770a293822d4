pub mod jobs;

use std::future::Future;

use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, warn};

/// Work triggered by an XP change.
///
/// Every XP change writes one outbox row per consumer in the same transaction
/// as the change itself. A scheduled job delivers them later, and each
/// consumer fails and retries on its own rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Consumer {
    Tier,
    Nickname,
}

impl Consumer {
    pub const ALL: [Consumer; 2] = [Consumer::Tier, Consumer::Nickname];

    pub const fn key(self) -> &'static str {
        match self {
            Consumer::Tier => "tier",
            Consumer::Nickname => "nickname",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Queues a re-evaluation of `user` for every consumer.
pub async fn emit(
    conn: &mut SqliteConnection,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for consumer in Consumer::ALL {
        sqlx::query(include_str!("queries/emit.sql"))
            .bind(consumer.key())
            .bind(guild.to_string())
            .bind(user.to_string())
            .bind(now)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Delivers up to `batch` pending (consumer, guild, user) groups.
///
/// Several pending rows for the same group are delivered with one handler
/// call. Groups that reach `max_attempts` failures stay in the table
/// undelivered and are skipped from then on.
pub async fn dispatch_pending<F, Fut>(
    db: &SqlitePool,
    max_attempts: i64,
    batch: i64,
    handler: F,
) -> Result<DispatchReport>
where
    F: Fn(Consumer, serenity::GuildId, serenity::UserId) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let rows: Vec<(String, String, String, i64, i64)> =
        sqlx::query_as(include_str!("queries/pending.sql"))
            .bind(max_attempts)
            .bind(batch)
            .fetch_all(db)
            .await?;

    let mut report = DispatchReport::default();

    for (consumer_key, guild_key, user_key, last_id, attempts) in rows {
        let Some(consumer) = Consumer::from_key(&consumer_key) else {
            warn!("Skipping outbox rows for unknown consumer '{consumer_key}'");
            continue;
        };
        let guild = serenity::GuildId(guild_key.parse()?);
        let user = serenity::UserId(user_key.parse()?);

        match handler(consumer, guild, user).await {
            Ok(()) => {
                sqlx::query(include_str!("queries/mark_delivered.sql"))
                    .bind(chrono::Utc::now().timestamp())
                    .bind(&consumer_key)
                    .bind(&guild_key)
                    .bind(&user_key)
                    .bind(last_id)
                    .execute(db)
                    .await?;
                report.delivered += 1;
            }
            Err(e) => {
                sqlx::query(include_str!("queries/mark_failed.sql"))
                    .bind(format!("{e}"))
                    .bind(&consumer_key)
                    .bind(&guild_key)
                    .bind(&user_key)
                    .bind(last_id)
                    .execute(db)
                    .await?;
                report.failed += 1;

                if attempts + 1 >= max_attempts {
                    error!(
                        "Giving up on {} for {user} in {guild} after {max_attempts} attempts: {e}",
                        consumer.key()
                    );
                } else {
                    warn!(
                        "{} for {user} in {guild} failed (attempt {}): {e}",
                        consumer.key(),
                        attempts + 1
                    );
                }
            }
        }
    }

    Ok(report)
}

/// Removes rows delivered before `before` (unix seconds).
pub async fn prune_delivered(db: &SqlitePool, before: i64) -> Result<u64> {
    let result = sqlx::query(include_str!("queries/prune_delivered.sql"))
        .bind(before)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_dead(db: &SqlitePool, max_attempts: i64) -> Result<i64> {
    sqlx::query_scalar(include_str!("queries/count_dead.sql"))
        .bind(max_attempts)
        .fetch_one(db)
        .await
        .map_err(|e| eyre!("failed to count dead outbox rows: {e}"))
}
