//! Outbound side of the chat platform.
//!
//! The engine, the reminder dispatcher and the DM intents only talk to Discord
//! through [`ChatPort`], so they can run against a recording fake in tests.

use crate::config::DISCORD_MESSAGE_LIMIT;
use crate::discord_text::split_message;
use async_trait::async_trait;
use serenity::all::{
    Cache, ChannelId, ChannelType, CreateMessage, GuildId, Http, MessageId, ReactionType, UserId,
};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Sends `content`, split if needed. Returns the id of the last message.
    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<u64>;
    async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> anyhow::Result<()>;
    async fn send_direct(&self, user_id: u64, content: &str) -> anyhow::Result<()>;
    async fn broadcast_typing(&self, channel_id: u64) -> anyhow::Result<()>;
    fn guild_ids(&self) -> Vec<u64>;
    /// First text channel in the guild the bot may write to.
    fn fallback_channel(&self, guild_id: u64) -> Option<u64>;
}

pub struct DiscordPort {
    http: Arc<Http>,
    cache: Arc<Cache>,
    bot_id: u64,
}

impl DiscordPort {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, bot_id: u64) -> Self {
        Self { http, cache, bot_id }
    }
}

#[async_trait]
impl ChatPort for DiscordPort {
    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<u64> {
        let channel = ChannelId::new(channel_id);
        let mut last_id = None;
        for chunk in split_message(content, DISCORD_MESSAGE_LIMIT) {
            let sent = channel
                .send_message(&self.http, CreateMessage::new().content(chunk))
                .await?;
            last_id = Some(sent.id.get());
        }
        last_id.ok_or_else(|| anyhow::anyhow!("Refusing to send an empty message"))
    }

    async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> anyhow::Result<()> {
        ChannelId::new(channel_id)
            .create_reaction(
                &self.http,
                MessageId::new(message_id),
                ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: u64, content: &str) -> anyhow::Result<()> {
        let dm = UserId::new(user_id).create_dm_channel(&self.http).await?;
        for chunk in split_message(content, DISCORD_MESSAGE_LIMIT) {
            dm.id
                .send_message(&self.http, CreateMessage::new().content(chunk))
                .await?;
        }
        debug!("Sent DM to user {}", user_id);
        Ok(())
    }

    async fn broadcast_typing(&self, channel_id: u64) -> anyhow::Result<()> {
        ChannelId::new(channel_id).broadcast_typing(&self.http).await?;
        Ok(())
    }

    fn guild_ids(&self) -> Vec<u64> {
        self.cache.guilds().into_iter().map(|g| g.get()).collect()
    }

    fn fallback_channel(&self, guild_id: u64) -> Option<u64> {
        let guild = self.cache.guild(GuildId::new(guild_id))?;
        let member = guild.members.get(&UserId::new(self.bot_id))?;
        guild
            .channels
            .values()
            .filter(|c| c.kind == ChannelType::Text)
            .filter(|c| {
                let permissions = guild.user_permissions_in(c, member);
                permissions.view_channel() && permissions.send_messages()
            })
            .min_by_key(|c| (c.position, c.id))
            .map(|c| c.id.get())
    }
}
