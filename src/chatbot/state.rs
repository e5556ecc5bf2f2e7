//! All in-memory bot state, owned by one object and handed to the engine.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::chatbot::conversation::{ConversationKey, ConversationStore, Message};
use crate::chatbot::message::IncomingMessage;
use crate::mute::MuteLedger;
use crate::settings::{GroupSettings, SettingsStore};
use crate::spam::{SpamHeuristic, SpamSignal, SpamThresholds};

/// What to do with a group message before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Clean,
    /// Sender is muted; the message should be removed.
    Muted,
    /// Local heuristic fired; needs confirmation before punishing.
    Suspicious(Vec<SpamSignal>),
}

pub struct ChatState {
    pub conversations: ConversationStore,
    pub spam: SpamHeuristic,
    pub mutes: MuteLedger,
    pub settings: SettingsStore,
}

impl ChatState {
    pub fn new(history_capacity: usize, default_settings: GroupSettings) -> Self {
        Self {
            conversations: ConversationStore::new(history_capacity),
            spam: SpamHeuristic::new(SpamThresholds::default()),
            mutes: MuteLedger::new(),
            settings: SettingsStore::new(default_settings),
        }
    }

    /// Mute check, then spam scoring. Private messages are always clean.
    pub fn moderate(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> Verdict {
        if msg.is_private {
            return Verdict::Clean;
        }
        if self.mutes.is_muted(msg.chat_id, msg.user_id, now) {
            return Verdict::Muted;
        }

        let settings = self.settings.get(msg.chat_id);
        let signals = self
            .spam
            .evaluate(msg.chat_id, msg.user_id, &msg.text, &settings, now);

        if signals.is_empty() {
            Verdict::Clean
        } else {
            Verdict::Suspicious(signals)
        }
    }

    /// Record the user's prompt and return the history to send upstream.
    ///
    /// The prompt stays in history even if no reply ever arrives.
    pub fn push_prompt(&self, key: ConversationKey, prompt: &str, now: DateTime<Utc>) -> Vec<Message> {
        self.conversations.append_at(key, Message::user(prompt), now);
        self.conversations.history(key)
    }

    pub fn push_reply(&self, key: ConversationKey, reply: &str, now: DateTime<Utc>) {
        self.conversations.append_at(key, Message::assistant(reply), now);
    }

    /// Periodic cleanup of idle groups and lapsed spam counters.
    pub fn sweep(&self, group_idle: Duration, now: DateTime<Utc>) {
        let evicted = self.conversations.evict_idle(group_idle, now);
        for chat_id in &evicted {
            info!("🧹 Cleared history for group {} due to inactivity", chat_id);
        }
        let purged = self.spam.purge_stale(now);
        if !evicted.is_empty() || purged > 0 {
            info!(
                "Sweep: {} group(s) evicted, {} spam counter(s) purged, {} conversation(s) live",
                evicted.len(),
                purged,
                self.conversations.len()
            );
        }
    }
}
