//! Reply-decision engine.
//!
//! Every inbound message, reaction and presence change goes through here, as
//! does the periodic boredom check. The engine decides whether to talk, builds
//! the prompt from cached context and hands the model's answer to the chat
//! port. Model failures never escape: they are logged and reported as
//! [`Outcome::Degraded`]. Chat platform failures are returned to the caller.

pub mod boredom;
pub mod decision;

pub use boredom::BoredomMeter;
pub use decision::{decide_message, Decision, IncomingMessage, SkipReason};

use crate::cache::CachedMessage;
use crate::chat::ChatPort;
use crate::config::Behavior;
use crate::context::{ContextBudget, ConversationContext};
use crate::discord_text::clean_reply;
use crate::llm::ChatModel;
use crate::state::{BotState, Interaction};
use async_openai::types::ChatCompletionRequestMessage;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Deferred,
    Reacted,
    Replied,
    /// Spoke up unprompted (reaction, presence or boredom).
    Commented,
    /// Wanted to talk but the model gave nothing usable.
    Degraded,
}

pub struct Persona {
    pub bot_name: String,
    pub system_prompt: String,
    pub prefix: String,
    pub timezone: Tz,
    name_pattern: Regex,
}

impl Persona {
    pub fn new(
        bot_name: &str,
        system_prompt: &str,
        prefix: &str,
        timezone: Tz,
    ) -> Result<Self, regex::Error> {
        let name_pattern = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(bot_name)))?;
        Ok(Self {
            bot_name: bot_name.to_string(),
            system_prompt: system_prompt.to_string(),
            prefix: prefix.to_string(),
            timezone,
            name_pattern,
        })
    }

    pub fn mentions_name(&self, text: &str) -> bool {
        self.name_pattern.is_match(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub emoji: String,
    /// Text of the bot message that got the reaction.
    pub reacted_to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceChange {
    pub guild_id: u64,
    pub user_id: u64,
    pub user_name: String,
    pub started: Vec<String>,
    pub stopped: Vec<String>,
}

impl PresenceChange {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.started.is_empty() {
            parts.push(format!("{} just started {}", self.user_name, self.started.join(" and ")));
        }
        if !self.stopped.is_empty() {
            parts.push(format!("{} stopped {}", self.user_name, self.stopped.join(" and ")));
        }
        parts.join(", ")
    }
}

pub struct ReplyEngine {
    state: Arc<BotState>,
    model: Arc<dyn ChatModel>,
    persona: Persona,
    rng: Mutex<StdRng>,
}

impl ReplyEngine {
    pub fn new(state: Arc<BotState>, model: Arc<dyn ChatModel>, persona: Persona) -> Self {
        Self::with_rng(state, model, persona, StdRng::from_entropy())
    }

    /// Deterministic draws, for tests.
    pub fn seeded(state: Arc<BotState>, model: Arc<dyn ChatModel>, persona: Persona, seed: u64) -> Self {
        Self::with_rng(state, model, persona, StdRng::seed_from_u64(seed))
    }

    fn with_rng(state: Arc<BotState>, model: Arc<dyn ChatModel>, persona: Persona, rng: StdRng) -> Self {
        Self {
            state,
            model,
            persona,
            rng: Mutex::new(rng),
        }
    }

    pub fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    fn draw(&self) -> f64 {
        self.rng.lock().gen()
    }

    fn natural_delay(&self, behavior: &Behavior) -> Duration {
        let ms = self
            .rng
            .lock()
            .gen_range(behavior.reply_delay_min_ms..=behavior.reply_delay_max_ms);
        Duration::from_millis(ms)
    }

    fn budget(behavior: &Behavior) -> ContextBudget {
        ContextBudget {
            max_messages: behavior.max_context_messages,
            max_chars: behavior.context_char_budget,
        }
    }

    /// DMs, @mentions, replies to the bot and the bot's name all count.
    pub fn is_direct(&self, msg: &IncomingMessage) -> bool {
        msg.guild_id.is_none()
            || msg.mentions_bot
            || msg.replies_to_bot
            || self.persona.mentions_name(&msg.content)
    }

    pub async fn handle_message(
        &self,
        port: &dyn ChatPort,
        msg: &IncomingMessage,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Outcome> {
        if self.state.is_shutting_down() {
            return Ok(Outcome::Skipped(SkipReason::Inactive));
        }

        let behavior = self.state.behavior();
        let blacklisted = self.state.is_blacklisted(msg.author_id);
        let direct = self.is_direct(msg);
        let draw = self.draw();
        let decision = {
            let settings = self.state.settings.read();
            decide_message(
                &settings,
                blacklisted,
                &behavior,
                &self.persona.prefix,
                msg,
                direct,
                now,
                draw,
            )
        };

        if !matches!(
            decision,
            Decision::Skip(SkipReason::Blacklisted)
                | Decision::Skip(SkipReason::ChannelDisabled)
                | Decision::DeferToCommand
        ) {
            self.observe(msg, now);
        }

        match decision {
            Decision::Skip(reason) => {
                debug!(
                    "Ignoring message {} from {} in {}: {:?}",
                    msg.message_id, msg.author_id, msg.channel_id, reason
                );
                Ok(Outcome::Skipped(reason))
            }
            Decision::DeferToCommand => Ok(Outcome::Deferred),
            Decision::React => self.react(port, msg).await,
            Decision::Reply { direct } => {
                if !direct {
                    let cooling = self
                        .state
                        .runtime
                        .lock()
                        .reply_cooldowns
                        .check(msg.author_id, now, behavior.reply_cooldown())
                        .is_err();
                    if cooling {
                        debug!("Ambient reply to {} suppressed by cooldown", msg.author_id);
                        return Ok(Outcome::Skipped(SkipReason::Cooldown));
                    }
                }
                self.reply_to(port, msg, now, &behavior).await
            }
        }
    }

    fn observe(&self, msg: &IncomingMessage, now: DateTime<Utc>) {
        self.state.cache.insert(
            msg.channel_id,
            CachedMessage {
                message_id: msg.message_id,
                author_name: msg.author_name.clone(),
                content: msg.content.clone(),
                from_bot: false,
                at: now,
            },
        );
        self.state
            .record_interaction(msg.author_id, Interaction::Message, now);
        if let Some(guild_id) = msg.guild_id {
            self.state.note_activity(guild_id, now);
        }
    }

    async fn react(&self, port: &dyn ChatPort, msg: &IncomingMessage) -> anyhow::Result<Outcome> {
        let behavior = self.state.behavior();
        let emoji = {
            let mut rng = self.rng.lock();
            behavior.reaction_emojis.choose(&mut *rng).cloned()
        };
        let Some(emoji) = emoji else {
            return Ok(Outcome::Skipped(SkipReason::NotTriggered));
        };
        port.add_reaction(msg.channel_id, msg.message_id, &emoji)
            .await?;
        debug!("Reacted {} to message {}", emoji, msg.message_id);
        Ok(Outcome::Reacted)
    }

    async fn reply_to(
        &self,
        port: &dyn ChatPort,
        msg: &IncomingMessage,
        now: DateTime<Utc>,
        behavior: &Behavior,
    ) -> anyhow::Result<Outcome> {
        let history = self.state.cache.recent(
            msg.channel_id,
            now,
            behavior.context_window(),
            Some(msg.message_id),
        );
        let messages = ConversationContext::build(
            &self.persona.system_prompt,
            &self.situation_note(now),
            &self.persona.bot_name,
            &history,
            (&msg.author_name, &msg.content),
            Self::budget(behavior),
        )?;
        info!(
            "Replying to {} in channel {} ({} context messages)",
            msg.author_name,
            msg.channel_id,
            history.len()
        );
        self.respond(port, msg.channel_id, msg.guild_id, messages, now, behavior, Outcome::Replied)
            .await
    }

    fn situation_note(&self, now: DateTime<Utc>) -> String {
        let max_tokens = self.state.settings.read().max_reply_length;
        format!(
            "it's {} for you right now. keep it under {} tokens.",
            now.with_timezone(&self.persona.timezone).format("%A %H:%M"),
            max_tokens
        )
    }

    #[allow(clippy::too_many_arguments)]
    async fn respond(
        &self,
        port: &dyn ChatPort,
        channel_id: u64,
        guild_id: Option<u64>,
        messages: Vec<ChatCompletionRequestMessage>,
        now: DateTime<Utc>,
        behavior: &Behavior,
        success: Outcome,
    ) -> anyhow::Result<Outcome> {
        if let Err(e) = port.broadcast_typing(channel_id).await {
            debug!("Typing indicator failed in {}: {}", channel_id, e);
        }
        let delay = self.natural_delay(behavior);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let max_tokens = self.state.settings.read().max_reply_length;
        let raw = match self.model.complete(messages, max_tokens).await {
            Ok(raw) => raw,
            Err(e) => {
                error!("LLM call for channel {} failed: {}", channel_id, e);
                return Ok(Outcome::Degraded);
            }
        };
        let Some(reply) = clean_reply(&raw, &self.persona.bot_name) else {
            warn!("LLM returned nothing usable for channel {}", channel_id);
            return Ok(Outcome::Degraded);
        };

        let sent_id = port.send_message(channel_id, &reply).await?;
        self.state.cache.insert(
            channel_id,
            CachedMessage {
                message_id: sent_id,
                author_name: self.persona.bot_name.clone(),
                content: reply,
                from_bot: true,
                at: now,
            },
        );
        if let Some(guild_id) = guild_id {
            self.state.note_activity(guild_id, now);
        }
        Ok(success)
    }

    /// Shared gate for events that are not plain messages.
    fn event_gate(&self, user_id: u64, guild_id: Option<u64>, channel_id: Option<u64>, now: DateTime<Utc>) -> Option<SkipReason> {
        if self.state.is_shutting_down() {
            return Some(SkipReason::Inactive);
        }
        let settings = self.state.settings.read();
        if !settings.is_active(now) {
            return Some(SkipReason::Inactive);
        }
        if self.state.is_blacklisted(user_id) {
            return Some(SkipReason::Blacklisted);
        }
        if channel_id.is_some_and(|c| settings.is_channel_disabled(guild_id, c)) {
            return Some(SkipReason::ChannelDisabled);
        }
        None
    }

    /// Someone reacted to one of the bot's messages.
    pub async fn handle_reaction(
        &self,
        port: &dyn ChatPort,
        event: &ReactionEvent,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Outcome> {
        if let Some(reason) = self.event_gate(event.user_id, event.guild_id, Some(event.channel_id), now) {
            return Ok(Outcome::Skipped(reason));
        }
        let behavior = self.state.behavior();
        if self.draw() >= behavior.reaction_reply_chance {
            return Ok(Outcome::Skipped(SkipReason::NotTriggered));
        }

        let history = self
            .state
            .cache
            .recent(event.channel_id, now, behavior.context_window(), None);
        let line = format!(
            "*reacted {} to your message \"{}\"*",
            event.emoji, event.reacted_to
        );
        let messages = ConversationContext::build(
            &self.persona.system_prompt,
            &self.situation_note(now),
            &self.persona.bot_name,
            &history,
            (&event.user_name, &line),
            Self::budget(&behavior),
        )?;
        self.respond(port, event.channel_id, event.guild_id, messages, now, &behavior, Outcome::Commented)
            .await
    }

    /// Records the user's current activities and returns what changed since
    /// the last update. The first sighting of a user only records.
    pub fn track_presence(
        &self,
        guild_id: u64,
        user_id: u64,
        user_name: &str,
        activities: BTreeSet<String>,
    ) -> Option<PresenceChange> {
        let previous = self
            .state
            .runtime
            .lock()
            .presence
            .insert((guild_id, user_id), activities.clone())?;
        let started: Vec<String> = activities.difference(&previous).cloned().collect();
        let stopped: Vec<String> = previous.difference(&activities).cloned().collect();
        if started.is_empty() && stopped.is_empty() {
            return None;
        }
        Some(PresenceChange {
            guild_id,
            user_id,
            user_name: user_name.to_string(),
            started,
            stopped,
        })
    }

    pub async fn handle_presence(
        &self,
        port: &dyn ChatPort,
        change: &PresenceChange,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Outcome> {
        if let Some(reason) = self.event_gate(change.user_id, Some(change.guild_id), None, now) {
            return Ok(Outcome::Skipped(reason));
        }
        let behavior = self.state.behavior();
        if self.draw() >= behavior.presence_comment_chance {
            return Ok(Outcome::Skipped(SkipReason::NotTriggered));
        }

        let configured = self
            .state
            .settings
            .read()
            .guild(change.guild_id)
            .and_then(|g| g.presence_channel);
        let Some(channel_id) = self.pick_channel(port, change.guild_id, configured) else {
            return Ok(Outcome::Skipped(SkipReason::NoChannel));
        };

        let history = self
            .state
            .cache
            .recent(channel_id, now, behavior.context_window(), None);
        let messages = ConversationContext::build(
            &self.persona.system_prompt,
            &self.situation_note(now),
            &self.persona.bot_name,
            &history,
            ("(activity)", &change.describe()),
            Self::budget(&behavior),
        )?;
        info!("Commenting on presence change of {} in guild {}", change.user_name, change.guild_id);
        self.respond(port, channel_id, Some(change.guild_id), messages, now, &behavior, Outcome::Commented)
            .await
    }

    /// Configured channel unless muted, otherwise the port's fallback unless
    /// muted.
    fn pick_channel(&self, port: &dyn ChatPort, guild_id: u64, configured: Option<u64>) -> Option<u64> {
        let settings = self.state.settings.read();
        let usable = |channel: &u64| !settings.is_channel_disabled(Some(guild_id), *channel);
        configured
            .filter(usable)
            .or_else(|| port.fallback_channel(guild_id).filter(usable))
    }

    /// Boredom ticker. Each round also drops stale cache buckets and
    /// cooldown entries.
    pub async fn run_boredom(
        self: Arc<Self>,
        port: Arc<dyn ChatPort>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let every = Duration::from_secs(self.state.behavior().boredom_check_secs.max(1));
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if self.state.is_shutting_down() {
                break;
            }
            let now = Utc::now();
            self.housekeeping(now);
            self.boredom_tick(port.as_ref(), now).await;
        }
        debug!("Boredom ticker stopped");
    }

    pub fn housekeeping(&self, now: DateTime<Utc>) {
        let behavior = self.state.behavior();
        let pruned = self.state.cache.prune(now, behavior.context_window());
        if pruned > 0 {
            debug!("Pruned {} stale cache buckets", pruned);
        }
        let mut runtime = self.state.runtime.lock();
        runtime.command_cooldowns.sweep(now, behavior.command_cooldown());
        runtime.reply_cooldowns.sweep(now, behavior.reply_cooldown());
    }

    /// One boredom round over every guild. Returns how many guilds got a
    /// message.
    pub async fn boredom_tick(&self, port: &dyn ChatPort, now: DateTime<Utc>) -> usize {
        if self.state.is_shutting_down() {
            return 0;
        }
        {
            let settings = self.state.settings.read();
            if !settings.is_active(now) || !settings.boredom_enabled {
                return 0;
            }
        }

        let behavior = self.state.behavior();
        let mut fired = 0;
        for guild_id in port.guild_ids() {
            let draw = self.draw();
            let (should_fire, quiet_for) = {
                let mut runtime = self.state.runtime.lock();
                let last = runtime
                    .last_activity
                    .get(&guild_id)
                    .copied()
                    .unwrap_or(runtime.started_at);
                let quiet_for = now - last;
                let idle = quiet_for >= behavior.boredom_idle();
                let fire = runtime.boredom.entry(guild_id).or_default().observe(
                    idle,
                    behavior.boredom_increment,
                    behavior.boredom_max,
                    draw,
                );
                (fire, quiet_for)
            };
            if !should_fire {
                continue;
            }

            let configured = self
                .state
                .settings
                .read()
                .guild(guild_id)
                .and_then(|g| g.boredom_channel);
            let Some(channel_id) = self.pick_channel(port, guild_id, configured) else {
                debug!("Bored in guild {} but no channel to talk in", guild_id);
                continue;
            };

            match self.speak_up(port, guild_id, channel_id, quiet_for.num_minutes(), now, &behavior).await {
                Ok(Outcome::Commented) => {
                    info!("Boredom message sent to channel {} in guild {}", channel_id, guild_id);
                    fired += 1;
                }
                Ok(_) => {}
                Err(e) => error!("Boredom message for guild {} failed: {}", guild_id, e),
            }
        }
        fired
    }

    async fn speak_up(
        &self,
        port: &dyn ChatPort,
        guild_id: u64,
        channel_id: u64,
        quiet_minutes: i64,
        now: DateTime<Utc>,
        behavior: &Behavior,
    ) -> anyhow::Result<Outcome> {
        let history = self
            .state
            .cache
            .recent(channel_id, now, behavior.context_window(), None);
        let line = format!(
            "nobody has said anything for {} minutes. say something to get the chat going, or just complain about being bored",
            quiet_minutes
        );
        let messages = ConversationContext::build(
            &self.persona.system_prompt,
            &self.situation_note(now),
            &self.persona.bot_name,
            &history,
            ("(silence)", &line),
            Self::budget(behavior),
        )?;
        self.respond(port, channel_id, Some(guild_id), messages, now, behavior, Outcome::Commented)
            .await
    }
}
