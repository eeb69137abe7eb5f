//! Fixed-interval reconciliation of observed voice presence into minutes.
//!
//! Every tick takes a fresh snapshot of eligible members (connected, non-bot,
//! non-deafened) and credits one minute to everyone who was also eligible on
//! the previous tick. Requiring two consecutive ticks bounds the edge error
//! to one minute per session.

use crate::presence::PresenceSource;
use crate::store::{Period, Store};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type UserKey = (u64, u64); // (guild_id, user_id)

pub struct Reconciler<S: PresenceSource> {
    source: S,
    store: Arc<Store>,
    tick_interval: Duration,
    last_detected: Mutex<HashSet<UserKey>>,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl<S: PresenceSource> Reconciler<S> {
    pub fn new(source: S, store: Arc<Store>, tick_interval: Duration) -> Self {
        Self {
            source,
            store,
            tick_interval,
            last_detected: Mutex::new(HashSet::new()),
            task: Mutex::new(None),
        }
    }

    /// Spawns the tick loop. The first tick fires immediately, priming the
    /// detection snapshot from whoever is already connected. Calling start on
    /// a running reconciler is a no-op.
    pub async fn start(self: Arc<Self>) {
        let mut slot = self.task.lock().await;
        if slot.is_some() {
            debug!("Reconciler already running");
            return;
        }

        let (tx, mut rx) = watch::channel(false);
        let this = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(this.tick_interval);
            // A slow tick must not be followed by a catch-up burst, which
            // would credit the same interval twice
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => this.tick().await,
                    _ = rx.changed() => break,
                }
            }
        });
        *slot = Some((tx, handle));
        info!("Minutely reconciliation started");
    }

    /// Stops the tick loop, letting an in-flight tick finish its credit
    /// writes. Idempotent: stopping twice, or before start, is a no-op.
    pub async fn stop(&self) {
        let taken = self.task.lock().await.take();
        let Some((tx, handle)) = taken else {
            debug!("Reconciler stop: not running");
            return;
        };
        let _ = tx.send(true);
        if let Err(e) = handle.await {
            warn!("Reconciler task join error: {}", e);
        }
        info!("Minutely reconciliation stopped");
    }

    /// One reconciliation pass over all known guilds.
    pub async fn tick(&self) {
        let mut current: HashSet<UserKey> = HashSet::new();
        let mut names: HashMap<UserKey, String> = HashMap::new();
        let mut connected = 0usize;

        for guild_id in self.source.community_ids().await {
            let members = match self.source.voice_members(guild_id).await {
                Ok(members) => members,
                Err(e) => {
                    // This guild simply contributes no detections this tick
                    warn!("Voice scan failed for guild {}: {}", guild_id, e);
                    continue;
                }
            };
            for member in members {
                connected += 1;
                if member.bot || member.deafened {
                    continue;
                }
                let key = (guild_id, member.user_id);
                names.insert(key, member.display_name);
                current.insert(key);
            }
        }

        let previous = {
            let mut last = self.last_detected.lock().await;
            std::mem::take(&mut *last)
        };

        let period = Period::current();
        let mut credited = 0usize;
        for key in previous.intersection(&current) {
            let (guild_id, user_id) = *key;
            let Some(name) = names.get(key) else { continue };
            match self
                .store
                .credit_minutes(guild_id, user_id, name, 1, period)
                .await
            {
                Ok(()) => credited += 1,
                Err(e) => {
                    // Lost for this tick only; future ticks keep crediting
                    error!(
                        "Failed to credit minute to user {} in guild {}: {}",
                        user_id, guild_id, e
                    );
                }
            }
        }

        *self.last_detected.lock().await = current;

        if connected > 0 {
            info!(
                "Tick: {} connected, {} eligible, +1 minute for {} user(s)",
                connected,
                names.len(),
                credited
            );
        } else {
            debug!("Tick: no users connected in voice channels");
        }
    }
}
