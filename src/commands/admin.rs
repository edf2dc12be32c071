use super::require_admin;
use crate::config::Behavior;
use crate::state::BotState;
use crate::store::Collection;
use crate::{Context, Error};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use tracing::{error, info};

/// Counts for `!globalstatus`.
pub fn global_status(state: &BotState, guilds: usize, now: DateTime<Utc>) -> String {
    let users = state.users.lock().len();
    let reminders = state.reminders.lock().len();
    let blacklisted = state.blacklist.read().len();
    let enabled = state.settings.read().enabled;
    let uptime = now - state.runtime.lock().started_at;
    format!(
        "**global status:**\n\
         • guilds: {}\n\
         • tracked users: {}\n\
         • active reminders: {}\n\
         • blacklisted users: {}\n\
         • bot enabled: {}\n\
         • uptime: {}s",
        guilds,
        users,
        reminders,
        blacklisted,
        enabled,
        uptime.num_seconds()
    )
}

/// Grant admin privileges in this server
#[poise::command(prefix_command, guild_only, check = "require_admin")]
pub async fn setadmin(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let added = ctx
        .data()
        .state
        .update_settings(|s| s.guild_mut(guild_id).admins.insert(user.id.get()));
    let reply = if added {
        info!("{} made {} an admin in guild {}", ctx.author().name, user.name, guild_id);
        format!("made {} an admin", user.name)
    } else {
        format!("{} is already an admin", user.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Remove admin privileges in this server
#[poise::command(prefix_command, guild_only, check = "require_admin")]
pub async fn removeadmin(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let removed = ctx
        .data()
        .state
        .update_settings(|s| s.guild_mut(guild_id).admins.remove(&user.id.get()));
    let reply = if removed {
        info!("{} removed {} from admins in guild {}", ctx.author().name, user.name, guild_id);
        format!("removed {} from admins", user.name)
    } else {
        format!("{} isn't an admin", user.name)
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Use this channel for boredom or presence messages
#[poise::command(prefix_command, guild_only, check = "require_admin")]
pub async fn setchannel(ctx: Context<'_>, kind: String) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?.get();
    let channel_id = ctx.channel_id().get();
    let reply = match kind.to_lowercase().as_str() {
        "boredom" => {
            ctx.data()
                .state
                .update_settings(|s| s.guild_mut(guild_id).boredom_channel = Some(channel_id));
            "set this as the boredom channel"
        }
        "presence" => {
            ctx.data()
                .state
                .update_settings(|s| s.guild_mut(guild_id).presence_channel = Some(channel_id));
            "set this as the presence channel"
        }
        _ => "use: !setchannel boredom|presence",
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Show status across all servers
#[poise::command(prefix_command, check = "require_admin")]
pub async fn globalstatus(ctx: Context<'_>) -> Result<(), Error> {
    let guilds = ctx.data().port.guild_ids().len();
    let text = global_status(&ctx.data().state, guilds, Utc::now());
    ctx.say(text).await?;
    Ok(())
}

/// Shut down the bot after saving everything
#[poise::command(prefix_command, check = "require_admin", hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from: {}", ctx.author().name);
    ctx.say("shutting down gracefully...").await?;
    ctx.data().state.begin_shutdown();
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}

/// Reload behaviour tunables from the config file
#[poise::command(prefix_command, check = "require_admin")]
pub async fn reloadconfig(ctx: Context<'_>) -> Result<(), Error> {
    let path = &ctx.data().config.behavior_file;
    match Behavior::load(path) {
        Ok(behavior) => {
            ctx.data().state.set_behavior(behavior);
            info!("Reloaded behaviour from {}", path.display());
            ctx.say("reloaded. new settings are live").await?;
        }
        Err(e) => {
            error!("Failed to reload {}: {:#}", path.display(), e);
            ctx.say("that config is broken. keeping the old one").await?;
        }
    }
    Ok(())
}

/// Block a user from interacting with the bot
#[poise::command(prefix_command, check = "require_admin")]
pub async fn blacklist(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let data = ctx.data();
    let user_id = user.id.get();
    if user_id == data.bot_id {
        ctx.say("can't blacklist myself").await?;
        return Ok(());
    }
    if data.state.is_owner(user_id) {
        ctx.say("not blacklisting an owner").await?;
        return Ok(());
    }

    let added = data.state.blacklist.write().add(user_id);
    if added {
        data.state.request_save(Collection::Blacklist);
        info!("{} blacklisted {} ({})", ctx.author().name, user.name, user_id);
        ctx.say(format!("blacklisted {}", user.name)).await?;
    } else {
        ctx.say(format!("{} is already blacklisted", user.name)).await?;
    }
    Ok(())
}

/// Unblock a user
#[poise::command(prefix_command, check = "require_admin")]
pub async fn whitelist(ctx: Context<'_>, user: serenity::User) -> Result<(), Error> {
    let data = ctx.data();
    let removed = data.state.blacklist.write().remove(user.id.get());
    if removed {
        data.state.request_save(Collection::Blacklist);
        info!("{} whitelisted {}", ctx.author().name, user.name);
        ctx.say(format!("whitelisted {}", user.name)).await?;
    } else {
        ctx.say(format!("{} isn't blacklisted", user.name)).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_status_counts() {
        let state = BotState::new(Behavior::default());
        state.blacklist.write().add(3);
        let now = Utc::now();
        state
            .reminders
            .lock()
            .create(1, "stretch", now + chrono::Duration::hours(1), now)
            .unwrap();
        state.record_interaction(1, crate::state::Interaction::Message, now);

        let text = global_status(&state, 4, now);
        assert!(text.contains("• guilds: 4"));
        assert!(text.contains("• tracked users: 1"));
        assert!(text.contains("• active reminders: 1"));
        assert!(text.contains("• blacklisted users: 1"));
        assert!(text.contains("• bot enabled: true"));
    }
}
