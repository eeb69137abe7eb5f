use poise::serenity_prelude as serenity;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};
use voicetime::commands::{admin, config as config_cmd, stats};
use voicetime::config::Config;
use voicetime::presence::CachePresenceSource;
use voicetime::reconciler::Reconciler;
use voicetime::store::Store;
use voicetime::voice::events::HttpNotifier;
use voicetime::voice::sessions::SessionTracker;
use voicetime::Data;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    let store = Arc::new(Store::open(&config.data_dir).await?);
    let tracker = Arc::new(SessionTracker::new());

    // Filled in once the gateway context exists, so the ctrl-c path can stop
    // the tick loop before tearing the shards down
    let reconciler_slot: Arc<OnceLock<Arc<Reconciler<CachePresenceSource>>>> =
        Arc::new(OnceLock::new());
    let slot = reconciler_slot.clone();

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                stats::stats(),
                stats::live(),
                config_cmd::config(),
                admin::reset(),
                admin::shutdown(),
            ],
            owners: config.owner_id.map(serenity::UserId::new).into_iter().collect(),
            event_handler: |ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::VoiceStateUpdate { old, new } = event {
                        voicetime::voice::events::handle_voice_state_update(
                            ctx,
                            data,
                            old.as_ref(),
                            new,
                        )
                        .await;
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(
                    "Bot connected as {}, monitoring {} guild(s)",
                    ready.user.name,
                    ready.guilds.len()
                );
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let reconciler = Arc::new(Reconciler::new(
                    CachePresenceSource::new(ctx.cache.clone()),
                    store.clone(),
                    std::time::Duration::from_secs(config.tick_interval_secs),
                ));
                // First tick fires immediately, picking up already-connected users
                reconciler.clone().start().await;
                let _ = slot.set(reconciler.clone());

                Ok(Data {
                    config,
                    store,
                    tracker,
                    notifier: Arc::new(HttpNotifier::new(ctx.http.clone())),
                    reconciler,
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::GUILD_VOICE_STATES;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down...");
            if let Some(reconciler) = reconciler_slot.get() {
                reconciler.stop().await;
            }
            shard_manager.shutdown_all().await;
        }
    });

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    Ok(())
}
