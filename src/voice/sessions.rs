//! Live voice-session tracking, driven purely by presence transitions.
//!
//! Sessions exist to produce connect/disconnect/move notifications. Minute
//! crediting is handled independently by the reconciler; the two must stay
//! separate (a deafened user keeps a session but earns nothing).

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

/// A voice channel reference copied out of the cache at observation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: u64,
    pub name: String,
}

/// A before/after presence change for one user in one guild.
#[derive(Debug, Clone)]
pub struct VoiceUpdate {
    pub guild_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub old_channel: Option<ChannelRef>,
    pub new_channel: Option<ChannelRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Join(ChannelRef),
    Leave(ChannelRef),
    Move { from: ChannelRef, to: ChannelRef },
    None,
}

impl Transition {
    pub fn classify(old: Option<ChannelRef>, new: Option<ChannelRef>) -> Self {
        match (old, new) {
            (None, Some(channel)) => Transition::Join(channel),
            (Some(channel), None) => Transition::Leave(channel),
            (Some(from), Some(to)) if from.id != to.id => Transition::Move { from, to },
            // Same channel: the platform emits spurious updates for mute or
            // deafen toggles
            _ => Transition::None,
        }
    }
}

/// Ephemeral record of one user's current channel occupancy. Never persisted.
#[derive(Debug, Clone)]
pub struct VoiceSession {
    pub guild_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub channel_id: u64,
    pub channel_name: String,
    pub joined_at_ms: i64,
}

/// At most one [`VoiceSession`] per `(guild, user)` at any time.
#[derive(Default)]
pub struct SessionTracker {
    sessions: Mutex<HashMap<(u64, u64), VoiceSession>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one transition and returns the notification text for the
    /// guild's log channel, if any. LEAVE or MOVE without a live session
    /// mutates nothing and emits nothing.
    pub fn apply(&self, update: VoiceUpdate) -> Option<String> {
        let key = (update.guild_id, update.user_id);
        let mut sessions = self.sessions.lock().unwrap();

        match Transition::classify(update.old_channel, update.new_channel) {
            Transition::Join(channel) => {
                let session = VoiceSession {
                    guild_id: update.guild_id,
                    user_id: update.user_id,
                    display_name: update.display_name.clone(),
                    channel_id: channel.id,
                    channel_name: channel.name.clone(),
                    joined_at_ms: Utc::now().timestamp_millis(),
                };
                sessions.insert(key, session);
                Some(format!(
                    "🟢 **{}** connected to **{}**",
                    update.display_name, channel.name
                ))
            }
            Transition::Leave(_) => sessions.remove(&key).map(|session| {
                format!(
                    "🔴 **{}** disconnected from **{}**",
                    session.display_name, session.channel_name
                )
            }),
            Transition::Move { from, to } => {
                let session = sessions.get_mut(&key)?;
                session.channel_id = to.id;
                session.channel_name = to.name.clone();
                Some(format!(
                    "🔄 **{}** moved from **{}** to **{}**",
                    update.display_name, from.name, to.name
                ))
            }
            Transition::None => None,
        }
    }

    pub fn session(&self, guild_id: u64, user_id: u64) -> Option<VoiceSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(&(guild_id, user_id))
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: u64, name: &str) -> ChannelRef {
        ChannelRef {
            id,
            name: name.to_string(),
        }
    }

    fn update(
        user_id: u64,
        old: Option<ChannelRef>,
        new: Option<ChannelRef>,
    ) -> VoiceUpdate {
        VoiceUpdate {
            guild_id: 1,
            user_id,
            display_name: "Alice".to_string(),
            old_channel: old,
            new_channel: new,
        }
    }

    #[test]
    fn test_classify() {
        let general = channel(10, "General");
        let gaming = channel(11, "Gaming");

        assert_eq!(
            Transition::classify(None, Some(general.clone())),
            Transition::Join(general.clone())
        );
        assert_eq!(
            Transition::classify(Some(general.clone()), None),
            Transition::Leave(general.clone())
        );
        assert_eq!(
            Transition::classify(Some(general.clone()), Some(gaming.clone())),
            Transition::Move { from: general.clone(), to: gaming }
        );
        // Mute/deafen toggles surface as same-channel updates
        assert_eq!(
            Transition::classify(Some(general.clone()), Some(general)),
            Transition::None
        );
        assert_eq!(Transition::classify(None, None), Transition::None);
    }

    #[test]
    fn test_join_creates_single_session() {
        let tracker = SessionTracker::new();
        let text = tracker.apply(update(42, None, Some(channel(10, "General"))));

        assert_eq!(
            text.as_deref(),
            Some("🟢 **Alice** connected to **General**")
        );
        let session = tracker.session(1, 42).unwrap();
        assert_eq!(session.channel_id, 10);
        assert_eq!(session.channel_name, "General");
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn test_move_updates_channel_fields_in_place() {
        let tracker = SessionTracker::new();
        tracker.apply(update(42, None, Some(channel(10, "General"))));
        let joined_at = tracker.session(1, 42).unwrap().joined_at_ms;

        let text = tracker.apply(update(
            42,
            Some(channel(10, "General")),
            Some(channel(11, "Gaming")),
        ));

        assert_eq!(
            text.as_deref(),
            Some("🔄 **Alice** moved from **General** to **Gaming**")
        );
        let session = tracker.session(1, 42).unwrap();
        assert_eq!(session.channel_id, 11);
        assert_eq!(session.channel_name, "Gaming");
        // Move keeps the original join time
        assert_eq!(session.joined_at_ms, joined_at);
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn test_leave_destroys_session() {
        let tracker = SessionTracker::new();
        tracker.apply(update(42, None, Some(channel(10, "General"))));
        let text = tracker.apply(update(42, Some(channel(10, "General")), None));

        assert_eq!(
            text.as_deref(),
            Some("🔴 **Alice** disconnected from **General**")
        );
        assert!(tracker.session(1, 42).is_none());
        assert_eq!(tracker.session_count(), 0);
    }

    #[test]
    fn test_leave_without_session_is_silent() {
        let tracker = SessionTracker::new();
        let text = tracker.apply(update(42, Some(channel(10, "General")), None));
        assert!(text.is_none());
        assert_eq!(tracker.session_count(), 0);
    }

    #[test]
    fn test_move_without_session_is_silent() {
        let tracker = SessionTracker::new();
        let text = tracker.apply(update(
            42,
            Some(channel(10, "General")),
            Some(channel(11, "Gaming")),
        ));
        assert!(text.is_none());
        assert_eq!(tracker.session_count(), 0);
    }

    #[test]
    fn test_spurious_same_channel_update_is_ignored() {
        let tracker = SessionTracker::new();
        tracker.apply(update(42, None, Some(channel(10, "General"))));
        let before = tracker.session(1, 42).unwrap();

        let text = tracker.apply(update(
            42,
            Some(channel(10, "General")),
            Some(channel(10, "General")),
        ));

        assert!(text.is_none());
        let after = tracker.session(1, 42).unwrap();
        assert_eq!(after.channel_id, before.channel_id);
        assert_eq!(after.joined_at_ms, before.joined_at_ms);
    }

    #[test]
    fn test_rejoin_replaces_session() {
        let tracker = SessionTracker::new();
        tracker.apply(update(42, None, Some(channel(10, "General"))));
        tracker.apply(update(42, None, Some(channel(11, "Gaming"))));

        let session = tracker.session(1, 42).unwrap();
        assert_eq!(session.channel_id, 11);
        assert_eq!(tracker.session_count(), 1);
    }

    #[test]
    fn test_sessions_are_independent_per_user() {
        let tracker = SessionTracker::new();
        tracker.apply(update(42, None, Some(channel(10, "General"))));
        let mut other = update(43, None, Some(channel(10, "General")));
        other.display_name = "Bob".to_string();
        tracker.apply(other);

        tracker.apply(update(42, Some(channel(10, "General")), None));
        assert!(tracker.session(1, 42).is_none());
        assert!(tracker.session(1, 43).is_some());
    }
}
