pub mod commands;

use color_eyre::Result;
use poise::serenity_prelude as serenity;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, poise::ChoiceParameter)]
pub enum Currency {
    #[name = "coins"]
    Coin,
    #[name = "orbs"]
    Orb,
    #[name = "stars"]
    Star,
    #[name = "diamonds"]
    Diamond,
}

impl Currency {
    pub const ALL: [Currency; 4] = [
        Currency::Coin,
        Currency::Orb,
        Currency::Star,
        Currency::Diamond,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            Currency::Coin => "coin",
            Currency::Orb => "orb",
            Currency::Star => "star",
            Currency::Diamond => "diamond",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }

    pub const fn emoji(self) -> &'static str {
        match self {
            Currency::Coin => ":coin:",
            Currency::Orb => ":crystal_ball:",
            Currency::Star => ":star:",
            Currency::Diamond => ":gem:",
        }
    }
}

/// Outcome of a single balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// The delta was zero and nothing was written.
    NoOp,
    Applied(i64),
    /// The debit would have overdrawn the account; the balance is unchanged.
    Rejected { balance: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Completed { from_balance: i64, to_balance: i64 },
    Insufficient { balance: i64 },
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub currency: String,
    pub delta: i64,
    pub balance: i64,
    pub reason: String,
    pub created_at: i64,
}

pub async fn get_total(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    currency: Currency,
) -> Result<i64> {
    let mut conn = db.acquire().await?;
    balance_of(&mut conn, guild, user, currency).await
}

async fn balance_of(
    conn: &mut SqliteConnection,
    guild: serenity::GuildId,
    user: serenity::UserId,
    currency: Currency,
) -> Result<i64> {
    let amount: Option<i64> = sqlx::query_scalar(include_str!("queries/get_balance.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(currency.key())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(amount.unwrap_or(0))
}

/// All four balances of a user, zero for the ones never written.
pub async fn balances(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<Vec<(Currency, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(include_str!("queries/get_balances.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .fetch_all(db)
        .await?;

    Ok(Currency::ALL
        .into_iter()
        .map(|currency| {
            let amount = rows
                .iter()
                .find(|(key, _)| key == currency.key())
                .map_or(0, |(_, amount)| *amount);
            (currency, amount)
        })
        .collect())
}

#[instrument(skip(db))]
pub async fn update(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    currency: Currency,
    delta: i64,
    reason: &str,
) -> Result<LedgerUpdate> {
    if delta == 0 {
        return Ok(LedgerUpdate::NoOp);
    }

    let mut tx = db.begin().await?;
    let outcome = apply(&mut tx, guild, user, currency, delta, reason).await?;
    tx.commit().await?;

    Ok(outcome)
}

/// Applies a balance change on `conn` without opening a transaction of its own.
///
/// Callers that combine this with other writes are expected to run it inside
/// their transaction.
pub async fn apply(
    conn: &mut SqliteConnection,
    guild: serenity::GuildId,
    user: serenity::UserId,
    currency: Currency,
    delta: i64,
    reason: &str,
) -> Result<LedgerUpdate> {
    let balance: Option<i64> = if delta > 0 {
        sqlx::query_scalar(include_str!("queries/credit.sql"))
            .bind(guild.to_string())
            .bind(user.to_string())
            .bind(currency.key())
            .bind(delta)
            .fetch_optional(&mut *conn)
            .await?
    } else if delta < 0 {
        sqlx::query_scalar(include_str!("queries/debit.sql"))
            .bind(-delta)
            .bind(guild.to_string())
            .bind(user.to_string())
            .bind(currency.key())
            .bind(-delta)
            .fetch_optional(&mut *conn)
            .await?
    } else {
        return Ok(LedgerUpdate::NoOp);
    };

    let Some(balance) = balance else {
        let balance = balance_of(conn, guild, user, currency).await?;
        info!(
            "Rejected {} debit of {delta} for {user} in {guild}: balance is {balance}",
            currency.key()
        );
        return Ok(LedgerUpdate::Rejected { balance });
    };

    sqlx::query(include_str!("queries/log_entry.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(currency.key())
        .bind(delta)
        .bind(balance)
        .bind(reason)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *conn)
        .await?;

    info!(
        "{user} in {guild}: {delta:+} {} ({reason}), balance now {balance}",
        currency.key()
    );

    Ok(LedgerUpdate::Applied(balance))
}

/// Moves `amount` from one user to another; both sides commit or neither does.
#[instrument(skip(db))]
pub async fn transfer(
    db: &SqlitePool,
    guild: serenity::GuildId,
    from: serenity::UserId,
    to: serenity::UserId,
    currency: Currency,
    amount: i64,
    reason: &str,
) -> Result<Transfer> {
    if amount <= 0 || from == to {
        return Ok(Transfer::Invalid);
    }

    let mut tx = db.begin().await?;

    let from_balance = match apply(&mut tx, guild, from, currency, -amount, reason).await? {
        LedgerUpdate::Applied(balance) => balance,
        LedgerUpdate::Rejected { balance } => {
            tx.rollback().await?;
            return Ok(Transfer::Insufficient { balance });
        }
        LedgerUpdate::NoOp => return Ok(Transfer::Invalid),
    };

    let LedgerUpdate::Applied(to_balance) =
        apply(&mut tx, guild, to, currency, amount, reason).await?
    else {
        tx.rollback().await?;
        return Ok(Transfer::Invalid);
    };

    tx.commit().await?;

    Ok(Transfer::Completed {
        from_balance,
        to_balance,
    })
}

pub async fn history(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    limit: i64,
) -> Result<Vec<LogEntry>> {
    let rows: Vec<(String, i64, i64, String, i64)> =
        sqlx::query_as(include_str!("queries/history.sql"))
            .bind(guild.to_string())
            .bind(user.to_string())
            .bind(limit)
            .fetch_all(db)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(currency, delta, balance, reason, created_at)| LogEntry {
            currency,
            delta,
            balance,
            reason,
            created_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const GUILD: serenity::GuildId = serenity::GuildId(1);
    const ALICE: serenity::UserId = serenity::UserId(10);
    const BOB: serenity::UserId = serenity::UserId(20);

    #[tokio::test]
    async fn missing_balance_reads_as_zero() {
        let db = db::memory().await;
        assert_eq!(get_total(&db, GUILD, ALICE, Currency::Orb).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn credit_creates_and_accumulates() {
        let db = db::memory().await;

        let first = update(&db, GUILD, ALICE, Currency::Coin, 40, "test").await.unwrap();
        let second = update(&db, GUILD, ALICE, Currency::Coin, 2, "test").await.unwrap();

        assert_eq!(first, LedgerUpdate::Applied(40));
        assert_eq!(second, LedgerUpdate::Applied(42));
        assert_eq!(get_total(&db, GUILD, ALICE, Currency::Coin).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn zero_delta_is_a_no_op() {
        let db = db::memory().await;

        let outcome = update(&db, GUILD, ALICE, Currency::Star, 0, "test").await.unwrap();

        assert_eq!(outcome, LedgerUpdate::NoOp);
        assert!(history(&db, GUILD, ALICE, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overdraw_is_rejected_without_change() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 30, "seed").await.unwrap();

        let outcome = update(&db, GUILD, ALICE, Currency::Coin, -31, "spend").await.unwrap();

        assert_eq!(outcome, LedgerUpdate::Rejected { balance: 30 });
        assert_eq!(get_total(&db, GUILD, ALICE, Currency::Coin).await.unwrap(), 30);
        assert_eq!(history(&db, GUILD, ALICE, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debit_of_missing_account_is_rejected() {
        let db = db::memory().await;

        let outcome = update(&db, GUILD, BOB, Currency::Diamond, -1, "spend").await.unwrap();

        assert_eq!(outcome, LedgerUpdate::Rejected { balance: 0 });
    }

    #[tokio::test]
    async fn exact_debit_empties_the_account() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Orb, 5, "seed").await.unwrap();

        let outcome = update(&db, GUILD, ALICE, Currency::Orb, -5, "spend").await.unwrap();

        assert_eq!(outcome, LedgerUpdate::Applied(0));
    }

    #[tokio::test]
    async fn currencies_and_guilds_are_separate() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 7, "seed").await.unwrap();
        update(&db, serenity::GuildId(2), ALICE, Currency::Coin, 3, "seed")
            .await
            .unwrap();

        let all = balances(&db, GUILD, ALICE).await.unwrap();

        assert_eq!(
            all,
            vec![
                (Currency::Coin, 7),
                (Currency::Orb, 0),
                (Currency::Star, 0),
                (Currency::Diamond, 0)
            ]
        );
    }

    #[tokio::test]
    async fn every_applied_change_is_logged() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 10, "quiz win").await.unwrap();
        update(&db, GUILD, ALICE, Currency::Coin, -4, "shop").await.unwrap();

        let log = history(&db, GUILD, ALICE, 10).await.unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].delta, -4);
        assert_eq!(log[0].balance, 6);
        assert_eq!(log[0].reason, "shop");
        assert_eq!(log[1].reason, "quiz win");
    }

    #[tokio::test]
    async fn transfer_moves_funds() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 50, "seed").await.unwrap();

        let outcome = transfer(&db, GUILD, ALICE, BOB, Currency::Coin, 20, "gift")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Transfer::Completed {
                from_balance: 30,
                to_balance: 20
            }
        );
    }

    #[tokio::test]
    async fn failed_transfer_touches_nobody() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 10, "seed").await.unwrap();

        let outcome = transfer(&db, GUILD, ALICE, BOB, Currency::Coin, 11, "gift")
            .await
            .unwrap();

        assert_eq!(outcome, Transfer::Insufficient { balance: 10 });
        assert_eq!(get_total(&db, GUILD, ALICE, Currency::Coin).await.unwrap(), 10);
        assert_eq!(get_total(&db, GUILD, BOB, Currency::Coin).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn self_and_non_positive_transfers_are_invalid() {
        let db = db::memory().await;
        update(&db, GUILD, ALICE, Currency::Coin, 10, "seed").await.unwrap();

        let to_self = transfer(&db, GUILD, ALICE, ALICE, Currency::Coin, 5, "x").await.unwrap();
        let negative = transfer(&db, GUILD, ALICE, BOB, Currency::Coin, -5, "x").await.unwrap();

        assert_eq!(to_self, Transfer::Invalid);
        assert_eq!(negative, Transfer::Invalid);
    }

    #[tokio::test]
    async fn concurrent_credits_are_not_lost() {
        let db = db::memory().await;

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move {
                    update(&db, GUILD, ALICE, Currency::Coin, 1, "race").await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(get_total(&db, GUILD, ALICE, Currency::Coin).await.unwrap(), 20);
    }
}
