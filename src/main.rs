mod bot;
mod config;
mod db;
mod locks;
mod wisps;

use color_eyre::eyre::Result;
use tracing::instrument;

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt::init();

    let token = config::discord_token()?;
    bot::run(&token).await
}
