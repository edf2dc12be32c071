use crate::dm;
use crate::services::reminder::format_reminder_list;
use crate::{Context, Error};

/// List your active reminders
#[poise::command(prefix_command)]
pub async fn myreminders(ctx: Context<'_>) -> Result<(), Error> {
    let reminders = ctx.data().state.reminders.lock().list(ctx.author().id.get());
    ctx.say(format_reminder_list(&reminders, &ctx.data().config.timezone))
        .await?;
    Ok(())
}

/// Cancel a reminder by its id
#[poise::command(prefix_command)]
pub async fn cancelreminder(ctx: Context<'_>, id: String) -> Result<(), Error> {
    let reply = dm::cancel(&ctx.data().state, ctx.author().id.get(), &id);
    ctx.say(reply).await?;
    Ok(())
}
