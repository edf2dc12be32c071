pub mod cache;
pub mod chat;
pub mod commands;
pub mod config;
pub mod context;
pub mod cooldown;
pub mod discord_text;
pub mod dm;
pub mod engine;
pub mod handler;
pub mod llm;
pub mod persist;
pub mod reminders;
pub mod services;
pub mod state;
pub mod store;
pub mod timeparse;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub state: Arc<state::BotState>,
    pub engine: Arc<engine::ReplyEngine>,
    pub store: store::Store,
    pub port: Arc<dyn chat::ChatPort>,
    /// Bot's own user ID, used to spot mentions and replies
    pub bot_id: u64,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
