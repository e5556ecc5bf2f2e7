//! Rolling conversation histories.
//!
//! One bounded buffer per private user or group chat. Group buffers are
//! dropped after a period of inactivity; private ones live as long as the
//! process.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    Private(i64),
    Group(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Fixed-capacity FIFO. Pushing onto a full buffer drops the oldest message.
#[derive(Debug)]
struct ConversationBuffer {
    messages: VecDeque<Message>,
    /// Only set for group conversations.
    last_interaction: Option<DateTime<Utc>>,
}

pub struct ConversationStore {
    capacity: usize,
    buffers: DashMap<ConversationKey, ConversationBuffer>,
}

impl ConversationStore {
    /// `capacity` is clamped to at least one message.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: DashMap::new(),
        }
    }

    pub fn append(&self, key: ConversationKey, message: Message) {
        self.append_at(key, message, Utc::now());
    }

    pub fn append_at(&self, key: ConversationKey, message: Message, now: DateTime<Utc>) {
        let mut buffer = self.buffers.entry(key).or_insert_with(|| ConversationBuffer {
            messages: VecDeque::with_capacity(self.capacity),
            last_interaction: None,
        });

        if buffer.messages.len() >= self.capacity {
            buffer.messages.pop_front();
        }
        buffer.messages.push_back(message);

        if matches!(key, ConversationKey::Group(_)) {
            buffer.last_interaction = Some(now);
        }
    }

    pub fn history(&self, key: ConversationKey) -> Vec<Message> {
        self.buffers
            .get(&key)
            .map(|b| b.messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop every group conversation idle for longer than `idle_threshold`.
    /// Returns the chat ids that were evicted.
    pub fn evict_idle(&self, idle_threshold: Duration, now: DateTime<Utc>) -> Vec<i64> {
        let mut evicted = Vec::new();
        self.buffers.retain(|key, buffer| {
            let ConversationKey::Group(chat_id) = *key else {
                return true;
            };
            let idle = buffer
                .last_interaction
                .is_some_and(|last| now.signed_duration_since(last) > idle_threshold);
            if idle {
                evicted.push(chat_id);
            }
            !idle
        });
        evicted
    }

    /// Forget one conversation. Returns whether anything was stored.
    pub fn clear(&self, key: ConversationKey) -> bool {
        self.buffers.remove(&key).is_some()
    }

    pub fn last_interaction(&self, chat_id: i64) -> Option<DateTime<Utc>> {
        self.buffers
            .get(&ConversationKey::Group(chat_id))
            .and_then(|b| b.last_interaction)
    }

    /// Number of live conversations.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}
