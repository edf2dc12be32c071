use super::require_admin;
use crate::state::Settings;
use crate::{Context, Error};
use chrono::{DateTime, Utc};
use tracing::info;

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

/// One-line summary for `!status`.
pub fn status_line(settings: &Settings, guild_id: Option<u64>, now: DateTime<Utc>) -> String {
    let mut status = on_off(settings.enabled).to_string();
    if let Some(left) = settings.timeout_remaining(now) {
        status.push_str(&format!(", timed out for {}s", left.num_seconds()));
    }
    status.push_str(&format!(" | bored:{}", on_off(settings.boredom_enabled)));
    status.push_str(&format!(" | phantom:{}", on_off(settings.phantom_enabled)));

    if let Some(guild) = guild_id.and_then(|id| settings.guild(id)) {
        if let Some(channel) = guild.boredom_channel {
            status.push_str(&format!(" | boredom→<#{}>", channel));
        }
        if let Some(channel) = guild.presence_channel {
            status.push_str(&format!(" | presence→<#{}>", channel));
        }
        if let Some(chance) = guild.reply_chance_override {
            status.push_str(&format!(" | server reply chance:{}", chance));
        }
    }
    format!("i'm {}. base reply chance is {}", status, settings.reply_chance)
}

/// Clear my conversation memory for this channel
#[poise::command(prefix_command, check = "require_admin")]
pub async fn clearcontext(ctx: Context<'_>) -> Result<(), Error> {
    let dropped = ctx.data().state.cache.clear_channel(ctx.channel_id().get());
    info!("Cleared {} cached messages in channel {}", dropped, ctx.channel_id());
    ctx.say("ive been lobotomized in this channel specifically").await?;
    Ok(())
}

/// Show how much context is cached for this channel
#[poise::command(prefix_command, check = "require_admin")]
pub async fn contextinfo(ctx: Context<'_>) -> Result<(), Error> {
    let window = ctx.data().state.behavior().context_window();
    let (messages, chars) =
        ctx.data()
            .state
            .cache
            .channel_stats(ctx.channel_id().get(), Utc::now(), window);
    ctx.say(format!(
        "context stats: {} messages, {} chars from the last {} min",
        messages,
        chars,
        window.num_minutes()
    ))
    .await?;
    Ok(())
}

/// Stop or start talking in this channel
#[poise::command(prefix_command, guild_only, check = "require_admin")]
pub async fn mutechannel(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let channel_id = ctx.channel_id().get();
    let muted = ctx
        .data()
        .state
        .update_settings(|s| s.toggle_channel(guild_id, channel_id));
    info!("Channel {} in guild {} muted: {}", channel_id, guild_id, muted);
    let reply = if muted {
        "fine. i'll shut up in here"
    } else {
        "ok. i can talk in here again"
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Set the max reply length in tokens
#[poise::command(prefix_command, check = "require_admin")]
pub async fn maxreply(ctx: Context<'_>, length: i64) -> Result<(), Error> {
    let result = ctx
        .data()
        .state
        .update_settings(|s| s.set_max_reply_length(length));
    match result {
        Ok(()) => {
            ctx.say(format!("whatever. i'll keep it under {} tokens now", length))
                .await?
        }
        Err(e) => ctx.say(e.to_string()).await?,
    };
    Ok(())
}

/// Silence the bot for a while
#[poise::command(prefix_command, check = "require_admin")]
pub async fn timeout(ctx: Context<'_>, minutes: Option<i64>) -> Result<(), Error> {
    let minutes = minutes.unwrap_or(15);
    let result = ctx
        .data()
        .state
        .update_settings(|s| s.time_out(Utc::now(), minutes));
    match result {
        Ok(until) => {
            info!("{} timed the bot out until {}", ctx.author().name, until);
            ctx.say(format!("ok whatever. i'm out for {} min", minutes))
                .await?
        }
        Err(e) => ctx.say(e.to_string()).await?,
    };
    Ok(())
}

/// End a timeout early
#[poise::command(prefix_command, check = "require_admin")]
pub async fn resume(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().state.update_settings(|s| s.resume());
    ctx.say("fine. i'm back").await?;
    Ok(())
}

/// Turn the bot on or off
#[poise::command(prefix_command, check = "require_admin")]
pub async fn toggle(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx.data().state.update_settings(|s| s.toggle_enabled());
    info!("{} switched the bot {}", ctx.author().name, on_off(enabled));
    ctx.say(format!("i'm {} now", on_off(enabled))).await?;
    Ok(())
}

/// Set the base reply chance
#[poise::command(prefix_command, check = "require_admin")]
pub async fn replychance(ctx: Context<'_>, chance: f64) -> Result<(), Error> {
    let result = ctx.data().state.update_settings(|s| s.set_reply_chance(chance));
    match result {
        Ok(()) => ctx.say(format!("base reply chance set to {}", chance)).await?,
        Err(e) => ctx.say(e.to_string()).await?,
    };
    Ok(())
}

/// Override the reply chance for this server
#[poise::command(prefix_command, guild_only, check = "require_admin")]
pub async fn guildreplychance(ctx: Context<'_>, value: String) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let chance = if value.eq_ignore_ascii_case("reset") {
        None
    } else {
        match value.trim().parse::<f64>() {
            Ok(chance) => Some(chance),
            Err(_) => {
                ctx.say("no clue what you meant. try `!guildreplychance 0.2` or `!guildreplychance reset`")
                    .await?;
                return Ok(());
            }
        }
    };

    let result = ctx
        .data()
        .state
        .update_settings(|s| s.set_guild_reply_chance(guild_id, chance));
    let reply = match (result, chance) {
        (Ok(()), Some(chance)) => format!("reply chance for this server set to {}", chance),
        (Ok(()), None) => "this server uses the base reply chance again".to_string(),
        (Err(e), _) => e.to_string(),
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Toggle boredom messages
#[poise::command(prefix_command, check = "require_admin")]
pub async fn toggleboredom(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx.data().state.update_settings(|s| s.toggle_boredom());
    ctx.say(format!("boredom messages {}", on_off(enabled))).await?;
    Ok(())
}

/// Toggle phantom replies
#[poise::command(prefix_command, check = "require_admin")]
pub async fn togglephantom(ctx: Context<'_>) -> Result<(), Error> {
    let enabled = ctx.data().state.update_settings(|s| s.toggle_phantom());
    ctx.say(format!("phantom replies {}", on_off(enabled))).await?;
    Ok(())
}

/// Show current bot status
#[poise::command(prefix_command)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let line = {
        let settings = ctx.data().state.settings.read();
        status_line(&settings, ctx.guild_id().map(|g| g.get()), Utc::now())
    };
    ctx.say(line).await?;
    Ok(())
}
