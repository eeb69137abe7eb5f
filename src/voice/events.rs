//! Serenity glue: turns gateway voice-state updates into plain transitions
//! and delivers the resulting notifications to the guild's log channel.

use crate::voice::sessions::{ChannelRef, VoiceUpdate};
use crate::Data;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-effort message delivery. Failures are logged and swallowed; they
/// never affect session state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, guild_id: u64, channel_id: u64, text: &str) -> anyhow::Result<()>;
}

pub struct HttpNotifier {
    http: Arc<serenity::Http>,
}

impl HttpNotifier {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, _guild_id: u64, channel_id: u64, text: &str) -> anyhow::Result<()> {
        serenity::ChannelId::new(channel_id)
            .send_message(&self.http, serenity::CreateMessage::new().content(text))
            .await?;
        Ok(())
    }
}

pub async fn handle_voice_state_update(
    ctx: &serenity::Context,
    data: &Data,
    old: Option<&serenity::VoiceState>,
    new: &serenity::VoiceState,
) {
    let Some(guild_id) = new.guild_id else {
        return;
    };

    let display_name = new
        .member
        .as_ref()
        .map(|member| member.display_name().to_string())
        .unwrap_or_else(|| new.user_id.to_string());

    let update = VoiceUpdate {
        guild_id: guild_id.get(),
        user_id: new.user_id.get(),
        display_name,
        old_channel: old
            .and_then(|state| state.channel_id)
            .map(|id| channel_ref(ctx, id)),
        new_channel: new.channel_id.map(|id| channel_ref(ctx, id)),
    };

    let Some(text) = data.tracker.apply(update) else {
        return;
    };

    let config = data.store.get_config(guild_id.get()).await;
    let Some(log_channel) = config.log_channel_id else {
        debug!(
            "No log channel configured for guild {}, dropping notification",
            guild_id
        );
        return;
    };

    if let Err(e) = data.notifier.send(guild_id.get(), log_channel, &text).await {
        warn!("Failed to send voice log to channel {}: {}", log_channel, e);
    }
}

fn channel_ref(ctx: &serenity::Context, id: serenity::ChannelId) -> ChannelRef {
    let name = ctx
        .cache
        .channel(id)
        .map(|channel| channel.name.clone())
        .unwrap_or_else(|| id.to_string());
    ChannelRef { id: id.get(), name }
}
