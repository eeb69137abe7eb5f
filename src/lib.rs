pub mod commands;
pub mod config;
pub mod presence;
pub mod reconciler;
pub mod store;
pub mod voice;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub store: Arc<store::Store>,
    pub tracker: Arc<voice::sessions::SessionTracker>,
    pub notifier: Arc<dyn voice::events::Notifier>,
    pub reconciler: Arc<reconciler::Reconciler<presence::CachePresenceSource>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
