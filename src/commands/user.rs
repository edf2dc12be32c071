use super::usage;
use crate::state::UserStats;
use crate::store::Collection;
use crate::{Context, Error};
use chrono_tz::Tz;

const OVERVIEW: &str = "**exia command help**\n\
use `!help <command>` for details\n\n\
**admin:** !setadmin, !removeadmin, !setchannel, !globalstatus, !shutdown, !reloadconfig\n\
**moderation:** !clearcontext, !contextinfo, !mutechannel, !maxreply, !timeout, !resume, !toggle, !replychance, !guildreplychance, !toggleboredom, !togglephantom, !blacklist, !whitelist\n\
**user:** !status, !commands, !myreminders, !cancelreminder, !mystats, !preference\n\
**dm:** remind me to X at Y, list reminders, cancel reminder X";

const COMMAND_LIST: &str = "**admin:** !setadmin, !removeadmin, !setchannel, !globalstatus, !shutdown, !reloadconfig\n\
**mod:** !clearcontext, !contextinfo, !mutechannel, !maxreply, !timeout, !resume, !toggle, !replychance, !guildreplychance, !toggleboredom, !togglephantom, !blacklist, !whitelist\n\
**user:** !status, !help, !mystats, !preference, !myreminders, !cancelreminder, !commands\n\
use `!help <command>` for details";

pub fn help_text(command: Option<&str>) -> String {
    match command {
        None => OVERVIEW.to_string(),
        Some(name) => usage(name)
            .map(str::to_string)
            .unwrap_or_else(|| format!("no help for '{}'", name.trim_start_matches('!'))),
    }
}

pub fn stats_text(stats: Option<&UserStats>, tz: &Tz) -> String {
    let Some(stats) = stats else {
        return "no stats recorded for you yet".to_string();
    };
    let last_seen = stats
        .last_seen
        .map(|at| at.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    let mut text = format!(
        "your stats:\n\
         • messages: {}\n\
         • commands: {}\n\
         • reminders set: {}\n\
         • last seen: {}",
        stats.messages_sent, stats.commands_used, stats.reminders_created, last_seen
    );
    if !stats.preferences.is_empty() {
        let prefs: Vec<String> = stats
            .preferences
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        text.push_str(&format!("\n• preferences: {}", prefs.join(", ")));
    }
    text
}

/// List all available commands
#[poise::command(prefix_command)]
pub async fn commands(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(COMMAND_LIST).await?;
    Ok(())
}

/// Explain a command
#[poise::command(prefix_command)]
pub async fn help(ctx: Context<'_>, command: Option<String>) -> Result<(), Error> {
    ctx.say(help_text(command.as_deref())).await?;
    Ok(())
}

/// Show your interaction statistics
#[poise::command(prefix_command)]
pub async fn mystats(ctx: Context<'_>) -> Result<(), Error> {
    let text = {
        let users = ctx.data().state.users.lock();
        stats_text(users.get(ctx.author().id.get()), &ctx.data().config.timezone)
    };
    ctx.say(text).await?;
    Ok(())
}

/// Set a personal preference
#[poise::command(prefix_command)]
pub async fn preference(
    ctx: Context<'_>,
    key: String,
    #[rest] value: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let result = data
        .state
        .users
        .lock()
        .set_preference(ctx.author().id.get(), &key, &value);
    let reply = match result {
        Ok(()) => {
            data.state.mark_dirty(Collection::UserData);
            format!("set your {} to {}", key.trim().to_lowercase(), value.trim())
        }
        Err(e) => e.to_string(),
    };
    ctx.say(reply).await?;
    Ok(())
}
