use poise::serenity_prelude as serenity;
use std::{future::Future, sync::Arc};

use color_eyre::{
    eyre::{eyre, ErrReport},
    Result,
};
use sqlx::SqlitePool;
use tokio::sync::OnceCell;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::{
    config, db,
    locks::KeyedLocks,
    wisps::{self, daily::DailyRewards, xp::caps::Caps},
};

/// Per-member locks shared by every consumer that changes a member.
pub type MemberLocks = KeyedLocks<(serenity::GuildId, serenity::UserId)>;

pub struct Bot {
    pub db: SqlitePool,
    pub caps: Caps,
    pub daily: DailyRewards,
    locks: Arc<MemberLocks>,
    scheduler: JobScheduler,
    scheduler_started: OnceCell<()>,
}

pub type CommandContext<'a> = poise::Context<'a, Bot, ErrReport>;

#[derive(Clone)]
pub struct JobContext {
    pub(crate) ctx: serenity::Context,
    pub(crate) db: SqlitePool,
    pub(crate) locks: Arc<MemberLocks>,
}

fn make_job<F, Fut>(name: &str, schedule: &str, callback: F, ctx: JobContext) -> Result<Job>
where
    F: Send + Sync + Copy + FnOnce(JobContext) -> Fut + 'static,
    Fut: Send + Future<Output = Result<()>>,
{
    let job_name = name.to_owned();
    Job::new_async(schedule, move |_uuid, _lock| {
        let job_name = job_name.clone();
        let ctx = ctx.clone();
        Box::pin(async move {
            match callback(ctx).await {
                Ok(()) => {
                    info!("Job {job_name} completed successfully.");
                }
                Err(e) => {
                    error!("Job {job_name} failed: {e}");
                }
            }
        })
    })
    .map_err(|e| eyre!("failed to create job {name}: {e}"))
}

impl Bot {
    async fn spawn_scheduler(&self, ctx: serenity::Context) -> Result<()> {
        info!("Spawning scheduler");

        let job_ctx = JobContext {
            ctx,
            db: self.db.clone(),
            locks: self.locks.clone(),
        };

        self.scheduler
            .add(make_job(
                "outbox::dispatch",
                &config::outbox_dispatch_schedule(),
                wisps::outbox::jobs::dispatch,
                job_ctx.clone(),
            )?)
            .await?;

        self.scheduler
            .add(make_job(
                "housekeeping::prune",
                &config::housekeeping_schedule(),
                wisps::housekeeping::prune,
                job_ctx,
            )?)
            .await?;

        self.scheduler.start().await?;

        Ok(())
    }
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &poise::Event<'_>,
    _framework: poise::FrameworkContext<'_, Bot, ErrReport>,
    bot: &Bot,
) -> Result<(), ErrReport> {
    match event {
        poise::Event::CacheReady { guilds } => {
            if let Err(e) = wisps::xp::listeners::on_cache_ready(ctx, bot, guilds).await {
                error!("Failed to reconcile voice sessions: {e}");
            }

            // cache ready fires again on reconnect; the scheduler must only start once
            let started = bot
                .scheduler_started
                .get_or_try_init(|| bot.spawn_scheduler(ctx.clone()))
                .await;
            if let Err(e) = started {
                error!("Failed to setup scheduler: {e}");
            }
        }
        poise::Event::Message {
            new_message: message,
        } => {
            if let Err(e) = wisps::xp::listeners::on_message(bot, message).await {
                error!("Failed to count message XP: {e}");
            }
        }
        poise::Event::ReactionAdd {
            add_reaction: reaction,
        } => {
            if let Err(e) = wisps::xp::listeners::on_reaction_add(ctx, bot, reaction).await {
                error!("Failed to count reaction XP: {e}");
            }
        }
        poise::Event::VoiceStateUpdate { old: _, new } => {
            if let Err(e) = wisps::xp::listeners::on_voice_state_update(bot, new).await {
                error!("Failed to count voice XP: {e}");
            }
        }
        poise::Event::Ready {
            data_about_bot: ready,
        } => {
            info!("{} connected successfully", ready.user.name);
        }
        _ => {}
    }
    Ok(())
}

pub async fn run(token: &str) -> Result<()> {
    let bot = Bot {
        db: db::connect().await?,
        caps: Caps::from_env(),
        daily: DailyRewards::from_env(),
        locks: Arc::new(MemberLocks::new()),
        scheduler: JobScheduler::new().await?,
        scheduler_started: OnceCell::new(),
    };

    let intents =
        serenity::GatewayIntents::non_privileged() | serenity::GatewayIntents::MESSAGE_CONTENT;
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: wisps::commands(),
            event_handler: |ctx, event, framework, bot| {
                Box::pin(event_handler(ctx, event, framework, bot))
            },
            ..Default::default()
        })
        .token(token)
        .intents(intents)
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                if let Some(guild_id) = config::testing_guild() {
                    info!("Setting up slash commands for testing guild {guild_id}");
                    poise::builtins::register_in_guild(
                        ctx,
                        &framework.options().commands,
                        guild_id,
                    )
                    .await?;
                } else {
                    info!("Setting up global slash commands");
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                }
                Ok(bot)
            })
        });

    framework.run().await?;

    Ok(())
}
