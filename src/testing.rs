//! In-memory stand-ins for Discord and the model, shared by the unit tests.

use crate::chat::ChatPort;
use crate::llm::{ChatModel, LlmError};
use async_openai::types::ChatCompletionRequestMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Message { channel: u64, content: String },
    Reaction { channel: u64, message: u64, emoji: String },
    Direct { user: u64, content: String },
}

#[derive(Default)]
pub struct FakePort {
    sent: Mutex<Vec<Sent>>,
    typing: Mutex<Vec<u64>>,
    guilds: Vec<u64>,
    fallbacks: HashMap<u64, u64>,
    closed_dms: HashSet<u64>,
    next_id: AtomicU64,
}

impl FakePort {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(9000),
            ..Default::default()
        }
    }

    pub fn with_guild(mut self, guild_id: u64, fallback: Option<u64>) -> Self {
        self.guilds.push(guild_id);
        if let Some(channel) = fallback {
            self.fallbacks.insert(guild_id, channel);
        }
        self
    }

    pub fn with_closed_dms(mut self, user_id: u64) -> Self {
        self.closed_dms.insert(user_id);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn typing(&self) -> Vec<u64> {
        self.typing.lock().clone()
    }
}

#[async_trait]
impl ChatPort for FakePort {
    async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<u64> {
        self.sent.lock().push(Sent::Message {
            channel: channel_id,
            content: content.to_string(),
        });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> anyhow::Result<()> {
        self.sent.lock().push(Sent::Reaction {
            channel: channel_id,
            message: message_id,
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn send_direct(&self, user_id: u64, content: &str) -> anyhow::Result<()> {
        if self.closed_dms.contains(&user_id) {
            anyhow::bail!("Cannot send messages to this user");
        }
        self.sent.lock().push(Sent::Direct {
            user: user_id,
            content: content.to_string(),
        });
        Ok(())
    }

    async fn broadcast_typing(&self, channel_id: u64) -> anyhow::Result<()> {
        self.typing.lock().push(channel_id);
        Ok(())
    }

    fn guild_ids(&self) -> Vec<u64> {
        self.guilds.clone()
    }

    fn fallback_channel(&self, guild_id: u64) -> Option<u64> {
        self.fallbacks.get(&guild_id).copied()
    }
}

/// Replays scripted results, then answers "whatever".
#[derive(Default)]
pub struct FakeModel {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<Vec<ChatCompletionRequestMessage>>>,
}

impl FakeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub fn last_prompt_text(&self) -> String {
        self.prompts
            .lock()
            .last()
            .map(|p| serde_json::to_string(p).unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        _max_tokens: u32,
    ) -> Result<String, LlmError> {
        self.prompts.lock().push(messages);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("whatever".to_string()))
    }
}
