use color_eyre::Result;
use tracing::{info, warn};

use crate::{
    bot::JobContext,
    config,
    wisps::{outbox, xp::caps},
};

/// Delivered outbox rows are kept this long for inspection.
const DELIVERED_RETENTION_SECS: i64 = 24 * 60 * 60;

pub async fn prune(ctx: JobContext) -> Result<()> {
    let before = chrono::Utc::now().timestamp() - DELIVERED_RETENTION_SECS;
    let events = outbox::prune_delivered(&ctx.db, before).await?;
    let counters = caps::prune(&ctx.db, caps::today()).await?;
    info!("Pruned {events} delivered outbox rows and {counters} stale cap counters");

    let dead = outbox::count_dead(&ctx.db, config::outbox_max_attempts()).await?;
    if dead > 0 {
        warn!("{dead} outbox rows have run out of attempts");
    }

    info!("{} member locks in use", ctx.locks.len());

    Ok(())
}
