pub mod daily;
pub mod housekeeping;
pub mod ledger;
pub mod nickname;
pub mod outbox;
pub mod tiers;
pub mod xp;

use color_eyre::{eyre::ErrReport, Result};

use crate::bot::{Bot, CommandContext};

/// Check bot liveness.
#[poise::command(slash_command)]
pub async fn ping(ctx: CommandContext<'_>) -> Result<()> {
    ctx.say("pong").await?;
    Ok(())
}

pub fn commands() -> Vec<poise::Command<Bot, ErrReport>> {
    vec![
        ping(),
        ledger::commands::economy(),
        daily::commands::daily(),
        xp::commands::xp(),
        tiers::commands::tier(),
    ]
}
