pub mod commands;

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;
use tracing::instrument;

use crate::{
    config,
    wisps::ledger::{self, Currency, LedgerUpdate},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyRewards {
    pub base: i64,
    pub streak_bonus: i64,
    pub streak_max: i64,
}

impl DailyRewards {
    pub fn from_env() -> Self {
        Self {
            base: config::daily_base_reward(),
            streak_bonus: config::daily_streak_bonus(),
            streak_max: config::daily_streak_max(),
        }
    }

    /// Coins for a claim on day `streak` of a streak; always at least one.
    pub fn reward(&self, streak: i64) -> i64 {
        let counted = streak.clamp(1, self.streak_max.max(1));
        (self.base + self.streak_bonus * (counted - 1)).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyClaim {
    Claimed {
        streak: i64,
        reward: i64,
        balance: i64,
    },
    AlreadyClaimed {
        streak: i64,
    },
}

fn next_streak(last: Option<(NaiveDate, i64)>, today: NaiveDate) -> Option<i64> {
    match last {
        Some((day, _)) if day >= today => None,
        Some((day, streak)) if day.succ_opt() == Some(today) => Some(streak + 1),
        _ => Some(1),
    }
}

/// Claims today's coins. The claim marker and the credit commit together, so
/// a user can never be paid twice for the same day.
#[instrument(skip(db, rewards))]
pub async fn claim(
    db: &SqlitePool,
    rewards: &DailyRewards,
    guild: serenity::GuildId,
    user: serenity::UserId,
    today: NaiveDate,
) -> Result<DailyClaim> {
    let mut tx = db.begin().await?;

    let row: Option<(String, i64)> = sqlx::query_as(include_str!("queries/get_claim.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .fetch_optional(&mut *tx)
        .await?;

    let last = match row {
        Some((day, streak)) => Some((day.parse::<NaiveDate>()?, streak)),
        None => None,
    };

    let Some(streak) = next_streak(last, today) else {
        let streak = last.map_or(0, |(_, streak)| streak);
        return Ok(DailyClaim::AlreadyClaimed { streak });
    };

    sqlx::query(include_str!("queries/put_claim.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(today.to_string())
        .bind(streak)
        .execute(&mut *tx)
        .await?;

    let reward = rewards.reward(streak);
    let reason = format!("daily claim (streak {streak})");
    let outcome = ledger::apply(&mut tx, guild, user, Currency::Coin, reward, &reason).await?;
    let LedgerUpdate::Applied(balance) = outcome else {
        return Err(eyre!("daily reward of {reward} was not applied: {outcome:?}"));
    };

    tx.commit().await?;

    Ok(DailyClaim::Claimed {
        streak,
        reward,
        balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    const GUILD: serenity::GuildId = serenity::GuildId(1);
    const USER: serenity::UserId = serenity::UserId(2);
    const REWARDS: DailyRewards = DailyRewards {
        base: 100,
        streak_bonus: 10,
        streak_max: 3,
    };

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    #[test]
    fn reward_grows_until_the_streak_limit() {
        assert_eq!(REWARDS.reward(1), 100);
        assert_eq!(REWARDS.reward(2), 110);
        assert_eq!(REWARDS.reward(3), 120);
        assert_eq!(REWARDS.reward(30), 120);
    }

    #[test]
    fn misconfigured_rewards_still_pay_something() {
        let broken = DailyRewards {
            base: 0,
            streak_bonus: -50,
            streak_max: 5,
        };

        assert_eq!(broken.reward(1), 1);
        assert_eq!(broken.reward(4), 1);
    }

    #[tokio::test]
    async fn claims_succeed_with_a_zero_base_reward() {
        let db = db::memory().await;
        let rewards = DailyRewards {
            base: 0,
            ..REWARDS
        };

        let outcome = claim(&db, &rewards, GUILD, USER, day(1)).await.unwrap();

        assert_eq!(
            outcome,
            DailyClaim::Claimed {
                streak: 1,
                reward: 1,
                balance: 1
            }
        );
    }

    #[test]
    fn streak_rules() {
        assert_eq!(next_streak(None, day(5)), Some(1));
        assert_eq!(next_streak(Some((day(4), 3)), day(5)), Some(4));
        assert_eq!(next_streak(Some((day(2), 3)), day(5)), Some(1));
        assert_eq!(next_streak(Some((day(5), 3)), day(5)), None);
    }

    #[tokio::test]
    async fn second_claim_on_the_same_day_pays_nothing() {
        let db = db::memory().await;

        let first = claim(&db, &REWARDS, GUILD, USER, day(1)).await.unwrap();
        let second = claim(&db, &REWARDS, GUILD, USER, day(1)).await.unwrap();

        assert_eq!(
            first,
            DailyClaim::Claimed {
                streak: 1,
                reward: 100,
                balance: 100
            }
        );
        assert_eq!(second, DailyClaim::AlreadyClaimed { streak: 1 });
        assert_eq!(
            ledger::get_total(&db, GUILD, USER, Currency::Coin).await.unwrap(),
            100
        );
    }

    #[tokio::test]
    async fn consecutive_days_build_a_streak() {
        let db = db::memory().await;

        claim(&db, &REWARDS, GUILD, USER, day(1)).await.unwrap();
        let second = claim(&db, &REWARDS, GUILD, USER, day(2)).await.unwrap();
        let after_gap = claim(&db, &REWARDS, GUILD, USER, day(4)).await.unwrap();

        assert_eq!(
            second,
            DailyClaim::Claimed {
                streak: 2,
                reward: 110,
                balance: 210
            }
        );
        assert_eq!(
            after_gap,
            DailyClaim::Claimed {
                streak: 1,
                reward: 100,
                balance: 310
            }
        );
    }
}
