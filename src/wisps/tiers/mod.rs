pub mod commands;
pub mod member;

use color_eyre::{eyre::eyre, Result};
use poise::serenity_prelude as serenity;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use self::member::{DiscordMember, GuildMember};
use crate::{
    bot::JobContext,
    wisps::{
        ledger::{self, Currency},
        xp,
    },
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reward {
    pub coins: i64,
    pub orbs: i64,
    pub stars: i64,
}

impl Reward {
    fn amounts(self) -> [(Currency, i64); 3] {
        [
            (Currency::Coin, self.coins),
            (Currency::Orb, self.orbs),
            (Currency::Star, self.stars),
        ]
    }
}

/// A role members get once their XP reaches `min_xp`.
///
/// A member holds at most one tier role and is only ever moved up. The first
/// time a member reaches a tier, its reward is paid out.
#[derive(Debug, Clone, PartialEq)]
pub struct Tier {
    pub role: serenity::RoleId,
    pub min_xp: f64,
    pub max_xp: Option<f64>,
    pub reward: Reward,
}

/// Role changes that move a member to the right tier.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Tier earned by XP, if any.
    pub target: Option<usize>,
    pub grant: Option<serenity::RoleId>,
    pub revoke: Vec<serenity::RoleId>,
}

/// Index of the highest tier `xp` qualifies for. `tiers` must be ordered by
/// `min_xp`.
pub fn target_tier(tiers: &[Tier], xp: f64) -> Option<usize> {
    tiers.iter().rposition(|tier| tier.min_xp <= xp)
}

fn highest_held(tiers: &[Tier], held: &[serenity::RoleId]) -> Option<usize> {
    tiers.iter().rposition(|tier| held.contains(&tier.role))
}

pub fn plan(
    tiers: &[Tier],
    held: &[serenity::RoleId],
    newcomer: Option<serenity::RoleId>,
    xp: f64,
) -> Plan {
    let target = target_tier(tiers, xp);
    let highest = highest_held(tiers, held);

    let held_below = |keep: usize| {
        tiers[..keep]
            .iter()
            .map(|tier| tier.role)
            .filter(|role| held.contains(role))
            .collect::<Vec<_>>()
    };

    match (target, highest) {
        (Some(target_index), highest) if highest.map_or(true, |h| h < target_index) => {
            let mut revoke = held_below(target_index);
            if let Some(newcomer) = newcomer.filter(|role| held.contains(role)) {
                revoke.push(newcomer);
            }
            Plan {
                target,
                grant: Some(tiers[target_index].role),
                revoke,
            }
        }
        (target, Some(highest)) => Plan {
            target,
            grant: None,
            revoke: held_below(highest),
        },
        (target, None) => Plan {
            target,
            ..Plan::default()
        },
    }
}

pub async fn list(db: &SqlitePool, guild: serenity::GuildId) -> Result<Vec<Tier>> {
    let rows: Vec<(String, f64, Option<f64>, i64, i64, i64)> =
        sqlx::query_as(include_str!("queries/list_tiers.sql"))
            .bind(guild.to_string())
            .fetch_all(db)
            .await?;

    let mut tiers = vec![];
    for (role, min_xp, max_xp, coins, orbs, stars) in rows {
        tiers.push(Tier {
            role: serenity::RoleId(role.parse()?),
            min_xp,
            max_xp,
            reward: Reward { coins, orbs, stars },
        });
    }

    Ok(tiers)
}

pub async fn save(db: &SqlitePool, guild: serenity::GuildId, tier: &Tier) -> Result<()> {
    sqlx::query(include_str!("queries/put_tier.sql"))
        .bind(guild.to_string())
        .bind(tier.role.to_string())
        .bind(tier.min_xp)
        .bind(tier.max_xp)
        .bind(tier.reward.coins)
        .bind(tier.reward.orbs)
        .bind(tier.reward.stars)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn remove(
    db: &SqlitePool,
    guild: serenity::GuildId,
    role: serenity::RoleId,
) -> Result<bool> {
    let result = sqlx::query(include_str!("queries/remove_tier.sql"))
        .bind(guild.to_string())
        .bind(role.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn newcomer_role(
    db: &SqlitePool,
    guild: serenity::GuildId,
) -> Result<Option<serenity::RoleId>> {
    let role: Option<Option<String>> =
        sqlx::query_scalar(include_str!("queries/get_newcomer.sql"))
            .bind(guild.to_string())
            .fetch_optional(db)
            .await?;

    match role.flatten() {
        Some(role) => Ok(Some(serenity::RoleId(role.parse()?))),
        None => Ok(None),
    }
}

pub async fn set_newcomer_role(
    db: &SqlitePool,
    guild: serenity::GuildId,
    role: Option<serenity::RoleId>,
) -> Result<()> {
    sqlx::query(include_str!("queries/set_newcomer.sql"))
        .bind(guild.to_string())
        .bind(role.map(|role| role.to_string()))
        .execute(db)
        .await?;
    Ok(())
}

/// Outbox consumer: moves a member to the tier their XP has earned.
pub async fn evaluate(
    ctx: &JobContext,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<()> {
    let _guard = ctx.locks.lock((guild, user)).await;

    let mut member = DiscordMember::fetch(ctx.ctx.http.clone(), guild, user).await?;
    if member.is_bot() {
        return Ok(());
    }

    apply(&ctx.db, &mut member, guild, user).await?;
    Ok(())
}

/// Applies the tier plan for `member` and settles the reward for the tier
/// their XP has earned. Returns that tier's index.
///
/// A failed grant is returned as an error before anything is paid. Failed
/// removals are only logged.
#[instrument(skip(db, member))]
pub async fn apply<M>(
    db: &SqlitePool,
    member: &mut M,
    guild: serenity::GuildId,
    user: serenity::UserId,
) -> Result<Option<usize>>
where
    M: GuildMember + Send,
{
    let tiers = list(db, guild).await?;
    if tiers.is_empty() {
        return Ok(None);
    }

    let newcomer = newcomer_role(db, guild).await?;
    let total = xp::get_total_xp(db, guild, user).await?;
    let plan = plan(&tiers, &member.roles(), newcomer, total);

    if let Some(role) = plan.grant {
        info!("Granting tier role {role} to {user} in {guild} ({total:.1} XP)");
        member
            .add_role(role)
            .await
            .map_err(|e| eyre!("failed to grant role {role} to {user} in {guild}: {e}"))?;
    }

    for role in &plan.revoke {
        if let Err(e) = member.remove_role(*role).await {
            warn!("Failed to remove role {role} from {user} in {guild}: {e}");
        }
    }

    if let Some(index) = plan.target {
        settle_reward(db, guild, user, &tiers[index]).await?;
    }

    Ok(plan.target)
}

/// Pays the reward for `tier` unless this member was already paid for its
/// role. Returns whether anything was paid.
async fn settle_reward(
    db: &SqlitePool,
    guild: serenity::GuildId,
    user: serenity::UserId,
    tier: &Tier,
) -> Result<bool> {
    let mut tx = db.begin().await?;

    let marked = sqlx::query(include_str!("queries/mark_rewarded.sql"))
        .bind(guild.to_string())
        .bind(user.to_string())
        .bind(tier.role.to_string())
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;
    if marked.rows_affected() == 0 {
        return Ok(false);
    }

    let reason = format!("reached tier {}", tier.role);
    for (currency, amount) in tier.reward.amounts() {
        ledger::apply(&mut tx, guild, user, currency, amount, &reason).await?;
    }

    tx.commit().await?;

    info!("Paid the {} tier reward to {user} in {guild}", tier.role);
    Ok(true)
}
