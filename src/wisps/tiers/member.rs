use std::{future::Future, sync::Arc};

use color_eyre::Result;
use poise::serenity_prelude as serenity;

/// The parts of a guild member the tier assigner reads and changes.
pub trait GuildMember {
    fn roles(&self) -> Vec<serenity::RoleId>;

    fn add_role(&mut self, role: serenity::RoleId) -> impl Future<Output = Result<()>> + Send;

    fn remove_role(&mut self, role: serenity::RoleId) -> impl Future<Output = Result<()>> + Send;
}

pub struct DiscordMember {
    http: Arc<serenity::Http>,
    member: serenity::Member,
}

impl DiscordMember {
    pub async fn fetch(
        http: Arc<serenity::Http>,
        guild: serenity::GuildId,
        user: serenity::UserId,
    ) -> Result<Self> {
        let member = guild.member(&http, user).await?;
        Ok(Self { http, member })
    }

    pub fn is_bot(&self) -> bool {
        self.member.user.bot
    }
}

impl GuildMember for DiscordMember {
    fn roles(&self) -> Vec<serenity::RoleId> {
        self.member.roles.clone()
    }

    async fn add_role(&mut self, role: serenity::RoleId) -> Result<()> {
        self.member.add_role(&self.http, role).await?;
        Ok(())
    }

    async fn remove_role(&mut self, role: serenity::RoleId) -> Result<()> {
        self.member.remove_role(&self.http, role).await?;
        Ok(())
    }
}
