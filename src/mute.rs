//! Time-bounded mutes per (chat, user).

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Mute expiries, checked on read. Expired entries are dropped the first
/// time they are looked at; there is no background sweep.
#[derive(Default)]
pub struct MuteLedger {
    records: DashMap<(i64, i64), DateTime<Utc>>,
}

impl MuteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mute `user_id` in `chat_id` until `now + duration`. Re-muting overwrites.
    pub fn mute(&self, chat_id: i64, user_id: i64, duration: Duration, now: DateTime<Utc>) -> DateTime<Utc> {
        let expiry = now + duration;
        self.records.insert((chat_id, user_id), expiry);
        expiry
    }

    pub fn is_muted(&self, chat_id: i64, user_id: i64, now: DateTime<Utc>) -> bool {
        let key = (chat_id, user_id);
        // Copy out so the shard lock is released before any removal.
        let expiry = self.records.get(&key).map(|e| *e.value());

        match expiry {
            Some(expiry) if expiry > now => true,
            Some(_) => {
                self.records.remove_if(&key, |_, expiry| *expiry <= now);
                false
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
