use crate::commands::parse_period;
use crate::{Context, Error};
use tracing::info;

/// Reset voice time data for a month (Admin)
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn reset(
    ctx: Context<'_>,
    #[description = "Month to reset, as MM/YYYY (defaults to the current month)"]
    period: Option<String>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;

    let period = match parse_period(period.as_deref()) {
        Ok(period) => period,
        Err(e) => {
            ctx.send(
                poise::CreateReply::default()
                    .content(format!("❌ {}", e))
                    .ephemeral(true),
            )
            .await?;
            return Ok(());
        }
    };

    ctx.defer_ephemeral().await?;

    let removed = ctx.data().store.delete_period(guild_id.get(), period).await?;
    if removed {
        info!(
            "Period {} reset for guild {} by {}",
            period,
            guild_id,
            ctx.author().name
        );
        ctx.say(format!("✅ Data for {} deleted successfully.", period))
            .await?;
    } else {
        ctx.say("❌ No data found to delete for that period.").await?;
    }
    Ok(())
}

/// Shut down the bot (Owner only)
#[poise::command(slash_command, owners_only, hide_in_help)]
pub async fn shutdown(ctx: Context<'_>) -> Result<(), Error> {
    info!("Shutdown command received from owner: {}", ctx.author().name);
    ctx.say("👋 Shutting down...").await?;
    // Stop ticking before the gateway goes away; in-flight credits finish
    ctx.data().reconciler.stop().await;
    ctx.framework().shard_manager().shutdown_all().await;
    Ok(())
}
