//! Read-only view of who is currently connected to voice channels.
//!
//! The reconciler only ever sees plain identifiers and values copied out of
//! the gateway cache at observation time, never cache handles themselves.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// A member currently connected to some voice channel.
#[derive(Debug, Clone)]
pub struct PresentMember {
    pub user_id: u64,
    pub display_name: String,
    pub bot: bool,
    /// Server- or self-deafened. Deafened members keep their session but do
    /// not earn minutes.
    pub deafened: bool,
}

/// Snapshot source enumerated by the reconciler once per tick.
#[async_trait]
pub trait PresenceSource: Send + Sync + 'static {
    async fn community_ids(&self) -> Vec<u64>;

    /// All members connected to any voice channel of one guild. A failure
    /// here only costs that guild one tick of detections.
    async fn voice_members(&self, guild_id: u64) -> anyhow::Result<Vec<PresentMember>>;
}

/// [`PresenceSource`] backed by the serenity gateway cache.
pub struct CachePresenceSource {
    cache: Arc<serenity::Cache>,
}

impl CachePresenceSource {
    pub fn new(cache: Arc<serenity::Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl PresenceSource for CachePresenceSource {
    async fn community_ids(&self) -> Vec<u64> {
        self.cache.guilds().into_iter().map(|id| id.get()).collect()
    }

    async fn voice_members(&self, guild_id: u64) -> anyhow::Result<Vec<PresentMember>> {
        let guild = self
            .cache
            .guild(serenity::GuildId::new(guild_id))
            .ok_or_else(|| anyhow::anyhow!("guild {} not in cache", guild_id))?;

        let mut members = Vec::new();
        for (user_id, state) in &guild.voice_states {
            if state.channel_id.is_none() {
                continue;
            }
            // Prefer the member cache; fall back to the member embedded in
            // the voice state. Without either we cannot attribute the minute.
            let (display_name, bot) = if let Some(member) = guild.members.get(user_id) {
                (member.display_name().to_string(), member.user.bot)
            } else if let Some(member) = &state.member {
                (member.display_name().to_string(), member.user.bot)
            } else {
                continue;
            };

            members.push(PresentMember {
                user_id: user_id.get(),
                display_name,
                bot,
                deafened: state.deaf || state.self_deaf,
            });
        }
        Ok(members)
    }
}
