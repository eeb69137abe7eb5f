use crate::store::GuildConfigPatch;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure the voice log channel (Admin)
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR"
)]
pub async fn config(
    ctx: Context<'_>,
    #[description = "Channel for voice connect/disconnect logs"]
    #[channel_types("Text")]
    logchannel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command must be used in a server")?;

    ctx.defer_ephemeral().await?;

    ctx.data()
        .store
        .set_config(
            guild_id.get(),
            GuildConfigPatch {
                log_channel_id: Some(logchannel.id.get()),
            },
        )
        .await?;

    ctx.say(format!("✅ Log channel configured: <#{}>", logchannel.id))
        .await?;
    Ok(())
}
