use color_eyre::Result;
use tracing::info;

use super::Consumer;
use crate::{
    bot::JobContext,
    config,
    wisps::{nickname, tiers},
};

const BATCH_SIZE: i64 = 100;

pub async fn dispatch(ctx: JobContext) -> Result<()> {
    let ctx = &ctx;
    let report = super::dispatch_pending(
        &ctx.db,
        config::outbox_max_attempts(),
        BATCH_SIZE,
        move |consumer, guild, user| async move {
            match consumer {
                Consumer::Tier => tiers::evaluate(ctx, guild, user).await,
                Consumer::Nickname => nickname::refresh(ctx, guild, user).await,
            }
        },
    )
    .await?;

    if report.delivered + report.failed > 0 {
        info!(
            "Outbox: {} delivered, {} failed",
            report.delivered, report.failed
        );
    }

    Ok(())
}
