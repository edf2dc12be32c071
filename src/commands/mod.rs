//! The `!` command surface.
//!
//! Every command passes [`global_check`] (shutdown, blacklist, per-user
//! cooldown). Moderation and admin commands add [`require_admin`]. Replies are
//! short, lowercase and in character; internal errors never reach the chat.

pub mod admin;
pub mod reminder;
pub mod settings;
pub mod user;

use crate::state::Interaction;
use crate::{Context, Data, Error};
use chrono::Utc;
use tracing::{debug, error, warn};

pub const PREFIX: &str = "!";

/// Name and usage line for `!help <command>`.
pub const HELP: &[(&str, &str)] = &[
    ("setadmin", "grant admin privileges: !setadmin @user"),
    ("removeadmin", "remove admin privileges: !removeadmin @user"),
    ("setchannel", "set special channel: !setchannel boredom|presence"),
    ("globalstatus", "show status across all servers"),
    ("shutdown", "gracefully shutdown the bot"),
    ("reloadconfig", "reload behaviour tunables from the config file"),
    ("clearcontext", "clear my conversation memory for this channel"),
    ("contextinfo", "show how much context i have for this channel"),
    ("mutechannel", "stop or start me talking in this channel"),
    ("maxreply", "set max response length: !maxreply 200 (50-1000)"),
    ("timeout", "silence me: !timeout [minutes] (default 15)"),
    ("resume", "wake me up from timeout"),
    ("toggle", "turn me on or off"),
    ("replychance", "set base reply chance: !replychance 0.1 (0.0-1.0)"),
    ("guildreplychance", "set this server's reply chance: !guildreplychance 0.1|reset"),
    ("toggleboredom", "toggle boredom messages"),
    ("togglephantom", "toggle phantom replies"),
    ("blacklist", "block user from interacting: !blacklist @user"),
    ("whitelist", "unblock user: !whitelist @user"),
    ("status", "show current bot status"),
    ("commands", "list all available commands"),
    ("help", "explain a command: !help <command>"),
    ("myreminders", "list your active reminders"),
    ("cancelreminder", "cancel a reminder: !cancelreminder R123"),
    ("mystats", "show your interaction statistics"),
    ("preference", "set personal preference: !preference key value"),
];

pub fn usage(command: &str) -> Option<&'static str> {
    let command = command.trim().trim_start_matches(PREFIX).to_lowercase();
    HELP.iter()
        .find(|(name, _)| *name == command)
        .map(|(_, text)| *text)
}

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        admin::setadmin(),
        admin::removeadmin(),
        admin::setchannel(),
        admin::globalstatus(),
        admin::shutdown(),
        admin::reloadconfig(),
        admin::blacklist(),
        admin::whitelist(),
        settings::clearcontext(),
        settings::contextinfo(),
        settings::mutechannel(),
        settings::maxreply(),
        settings::timeout(),
        settings::resume(),
        settings::toggle(),
        settings::replychance(),
        settings::guildreplychance(),
        settings::toggleboredom(),
        settings::togglephantom(),
        settings::status(),
        user::commands(),
        user::help(),
        user::mystats(),
        user::preference(),
        reminder::myreminders(),
        reminder::cancelreminder(),
    ]
}

/// Runs before every command. Returning `false` drops the invocation.
pub async fn global_check(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    let user_id = ctx.author().id.get();
    if data.state.is_shutting_down() || data.state.is_blacklisted(user_id) {
        return Ok(false);
    }

    let window = data.state.behavior().command_cooldown();
    let cooling = data
        .state
        .runtime
        .lock()
        .command_cooldowns
        .check(user_id, Utc::now(), window);
    if let Err(remaining) = cooling {
        debug!("Command from {} hit the cooldown", user_id);
        ctx.say(format!(
            "slow down. wait {:.1}s",
            remaining.num_milliseconds() as f64 / 1000.0
        ))
        .await?;
        return Ok(false);
    }
    Ok(true)
}

pub async fn pre_command(ctx: Context<'_>) {
    let now = Utc::now();
    let user_id = ctx.author().id.get();
    debug!("{} invoked !{}", ctx.author().name, ctx.command().name);
    ctx.data().state.record_interaction(user_id, Interaction::Message, now);
    ctx.data().state.record_interaction(user_id, Interaction::Command, now);
}

/// Command check for moderation and admin commands. Owners pass everywhere,
/// guild admins inside their guild.
pub async fn require_admin(ctx: Context<'_>) -> Result<bool, Error> {
    let guild_id = ctx.guild_id().map(|g| g.get());
    let allowed = ctx.data().state.is_admin(guild_id, ctx.author().id.get());
    if !allowed {
        ctx.say("you're not an admin").await?;
    }
    Ok(allowed)
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::ArgumentParse { ctx, input, error, .. } => {
            let name = ctx.command().name.clone();
            debug!("Bad arguments for !{} ({:?}): {}", name, input, error);
            let hint = match usage(&name) {
                Some(text) => format!("no clue what you meant. {}", text),
                None => "no clue what you meant".to_string(),
            };
            if let Err(e) = ctx.say(hint).await {
                warn!("Could not send usage hint: {}", e);
            }
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Command !{} failed: {}", ctx.command().name, error);
            if let Err(e) = ctx.say("something broke. try again in a bit").await {
                warn!("Could not report command failure: {}", e);
            }
        }
        poise::FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            // the check has already answered
            if let Some(error) = error {
                error!("Check for !{} failed: {}", ctx.command().name, error);
            }
        }
        poise::FrameworkError::GuildOnly { ctx, .. } => {
            if let Err(e) = ctx.say("that only works in a server").await {
                warn!("Could not send guild-only notice: {}", e);
            }
        }
        poise::FrameworkError::UnknownCommand { msg_content, .. } => {
            debug!("Unknown command: {}", msg_content);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}
