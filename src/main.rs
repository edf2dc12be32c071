use exia::chat::{ChatPort, DiscordPort};
use exia::commands::{self, PREFIX};
use exia::config::{Behavior, Config};
use exia::engine::{Persona, ReplyEngine};
use exia::llm::{ChatModel, LlmClient};
use exia::persist::AutoSaver;
use exia::reminders::ReminderDispatcher;
use exia::state::BotState;
use exia::store::Store;
use exia::{handler, Data};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    let behavior = Behavior::load(&config.behavior_file)?;
    info!("Starting {} with {:?}", config.bot_name, config);
    let discord_token = config.discord_token.clone();

    let store = Store::new(&config.data_dir);
    let state = Arc::new(BotState::load(&store, behavior));
    for owner in &config.owner_ids {
        state.add_owner(*owner);
    }

    let model: Arc<dyn ChatModel> = Arc::new(LlmClient::new(&config)?);
    let persona = Persona::new(
        &config.bot_name,
        &config.system_prompt,
        PREFIX,
        config.timezone,
    )?;
    let engine = Arc::new(ReplyEngine::new(state.clone(), model, persona));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let saver = tokio::spawn(
        AutoSaver::new(state.clone(), store.clone(), state.behavior().autosave_secs)
            .run(shutdown_rx.clone()),
    );

    let setup_state = state.clone();
    let setup_store = store.clone();
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(PREFIX.to_string()),
                case_insensitive_commands: true,
                ..Default::default()
            },
            command_check: Some(|ctx| Box::pin(commands::global_check(ctx))),
            pre_command: |ctx| Box::pin(commands::pre_command(ctx)),
            on_error: |error| Box::pin(commands::on_error(error)),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(handler::handle_event(ctx, event, data))
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, _framework| {
            Box::pin(async move {
                info!("Logged in as {} (ID: {})", ready.user.name, ready.user.id);
                let state = setup_state;
                match ctx.http.get_current_application_info().await {
                    Ok(app) => {
                        if let Some(owner) = app.owner {
                            state.add_owner(owner.id.get());
                        }
                    }
                    Err(e) => warn!("Could not fetch application owner: {}", e),
                }

                let bot_id = ready.user.id.get();
                let port: Arc<dyn ChatPort> =
                    Arc::new(DiscordPort::new(ctx.http.clone(), ctx.cache.clone(), bot_id));

                // intervals are read once, here
                let behavior = state.behavior();
                tokio::spawn(
                    ReminderDispatcher::new(state.clone(), port.clone(), behavior.reminder_tick_secs)
                        .run(shutdown_rx.clone()),
                );
                tokio::spawn(engine.clone().run_boredom(port.clone(), shutdown_rx));

                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));
                info!("Bot is ready!");

                Ok(Data {
                    config,
                    state,
                    engine,
                    store: setup_store,
                    port,
                    bot_id,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_PRESENCES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    let signal_state = state.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Signal received, shutting down");
        signal_state.begin_shutdown();
        shard_manager.shutdown_all().await;
    });

    info!("Starting bot...");
    let run = client.start().await;

    // Final flush, after the gateway has stopped delivering events
    state.begin_shutdown();
    let _ = shutdown_tx.send(true);
    if let Err(e) = saver.await {
        warn!("Auto-save task ended abnormally: {}", e);
    }
    let failures = state.save_all(&store);
    if failures > 0 {
        error!("{} collection(s) could not be saved on shutdown", failures);
    } else {
        info!("State saved, bye");
    }

    run.map_err(|e| anyhow::anyhow!("Client error: {}", e))
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
