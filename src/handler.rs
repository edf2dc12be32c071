//! Gateway events. Nothing in here ever fails the framework: an event that
//! cannot be handled is logged and dropped.

use crate::commands::PREFIX;
use crate::discord_text::strip_bot_mentions;
use crate::dm;
use crate::engine::{IncomingMessage, Outcome, ReactionEvent};
use crate::state::Interaction;
use crate::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude as serenity;
use std::collections::BTreeSet;
use tracing::{debug, error};

pub async fn handle_event(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    let (kind, result) = match event {
        serenity::FullEvent::Message { new_message } => {
            ("message", on_message(new_message, data).await)
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            ("reaction", on_reaction(add_reaction, data).await)
        }
        serenity::FullEvent::PresenceUpdate { new_data } => {
            ("presence", on_presence(new_data, data).await)
        }
        _ => return Ok(()),
    };
    if let Err(e) = result {
        error!("Dropped {} event: {:#}", kind, e);
    }
    Ok(())
}

fn display_name(msg: &serenity::Message) -> String {
    msg.member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| msg.author.global_name.clone())
        .unwrap_or_else(|| msg.author.name.clone())
}

async fn on_message(msg: &serenity::Message, data: &Data) -> anyhow::Result<()> {
    if msg.author.bot {
        return Ok(());
    }
    let now = Utc::now();
    let user_id = msg.author.id.get();
    let content = strip_bot_mentions(&msg.content, data.bot_id);

    if msg.guild_id.is_none()
        && !content.starts_with(PREFIX)
        && !data.state.is_blacklisted(user_id)
        && !data.state.is_shutting_down()
    {
        let tz = &data.config.timezone;
        let intent = dm::interpret(&content, now, tz);
        if let Some(reply) = dm::apply(&data.state, intent, user_id, now, tz) {
            data.state.record_interaction(user_id, Interaction::Message, now);
            data.port.send_message(msg.channel_id.get(), &reply).await?;
            return Ok(());
        }
    }

    let incoming = IncomingMessage {
        message_id: msg.id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        channel_id: msg.channel_id.get(),
        author_id: user_id,
        author_name: display_name(msg),
        content,
        mentions_bot: msg.mentions.iter().any(|u| u.id.get() == data.bot_id),
        replies_to_bot: msg
            .referenced_message
            .as_ref()
            .is_some_and(|m| m.author.id.get() == data.bot_id),
    };
    let outcome = data
        .engine
        .handle_message(data.port.as_ref(), &incoming, now)
        .await?;
    if !matches!(outcome, Outcome::Skipped(_) | Outcome::Deferred) {
        debug!("Message {} -> {:?}", incoming.message_id, outcome);
    }
    Ok(())
}

async fn on_reaction(reaction: &serenity::Reaction, data: &Data) -> anyhow::Result<()> {
    let Some(user_id) = reaction.user_id.map(|u| u.get()) else {
        return Ok(());
    };
    if user_id == data.bot_id {
        return Ok(());
    }
    let channel_id = reaction.channel_id.get();
    let message_id = reaction.message_id.get();
    // only reactions to messages the bot still remembers sending
    let Some(original) = data
        .state
        .cache
        .find(channel_id, message_id)
        .filter(|m| m.from_bot)
    else {
        return Ok(());
    };

    let user_name = reaction
        .member
        .as_ref()
        .map(|m| m.display_name().to_string())
        .unwrap_or_else(|| "someone".to_string());
    let event = ReactionEvent {
        guild_id: reaction.guild_id.map(|g| g.get()),
        channel_id,
        message_id,
        user_id,
        user_name,
        emoji: reaction.emoji.to_string(),
        reacted_to: original.content,
    };
    let outcome = data
        .engine
        .handle_reaction(data.port.as_ref(), &event, Utc::now())
        .await?;
    debug!("Reaction on {} -> {:?}", message_id, outcome);
    Ok(())
}

fn describe_activity(activity: &serenity::Activity) -> Option<String> {
    let verb = match activity.kind {
        serenity::ActivityType::Playing => "playing",
        serenity::ActivityType::Listening => "listening to",
        serenity::ActivityType::Watching => "watching",
        serenity::ActivityType::Streaming => "streaming",
        serenity::ActivityType::Competing => "competing in",
        _ => return None,
    };
    Some(format!("{} {}", verb, activity.name))
}

async fn on_presence(presence: &serenity::Presence, data: &Data) -> anyhow::Result<()> {
    let Some(guild_id) = presence.guild_id.map(|g| g.get()) else {
        return Ok(());
    };
    let user_id = presence.user.id.get();
    if user_id == data.bot_id || presence.user.bot == Some(true) {
        return Ok(());
    }

    let activities: BTreeSet<String> = presence
        .activities
        .iter()
        .filter_map(describe_activity)
        .collect();
    let user_name = presence
        .user
        .name
        .clone()
        .unwrap_or_else(|| "someone".to_string());
    let Some(change) = data
        .engine
        .track_presence(guild_id, user_id, &user_name, activities)
    else {
        return Ok(());
    };

    let outcome = data
        .engine
        .handle_presence(data.port.as_ref(), &change, Utc::now())
        .await?;
    debug!("Presence change of {} -> {:?}", user_id, outcome);
    Ok(())
}
