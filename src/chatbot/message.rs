//! Incoming Telegram messages, reduced to what the bot needs.

use crate::chatbot::conversation::ConversationKey;

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: i64,
    /// Negative for groups, the user's id for DMs.
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    pub is_private: bool,
    pub text: String,
    /// The bot is @mentioned somewhere in the text (entity-based).
    pub mentions_bot: bool,
    /// The message replies to one of the bot's messages.
    pub replies_to_bot: bool,
}

impl IncomingMessage {
    pub fn conversation_key(&self) -> ConversationKey {
        if self.is_private {
            ConversationKey::Private(self.user_id)
        } else {
            ConversationKey::Group(self.chat_id)
        }
    }

    /// Text to forward to the model, or `None` if the bot wasn't addressed.
    ///
    /// DMs are always answered. In groups the bot answers when the text starts
    /// with its @handle (which is stripped), when it is mentioned, or when the
    /// message is a reply to it.
    pub fn prompt_for(&self, bot_username: Option<&str>) -> Option<String> {
        let text = self.text.trim();

        if self.is_private {
            return (!text.is_empty()).then(|| text.to_string());
        }

        let stripped = bot_username.and_then(|name| strip_handle(text, name));
        let addressed = stripped.is_some() || self.mentions_bot || self.replies_to_bot;
        if !addressed {
            return None;
        }

        let prompt = stripped.unwrap_or(text).trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }
}

/// Strip a leading `@name` (case-insensitive). `None` if the text doesn't start with it.
fn strip_handle<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let rest = text.strip_prefix('@')?;
    let head = rest.get(..name.len())?;
    if !head.eq_ignore_ascii_case(name) {
        return None;
    }
    let tail = &rest[name.len()..];
    // "@askllmbot2" is someone else
    if tail.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some(tail.trim_start_matches([',', ':']))
}

/// Safely truncate a string at a char boundary.
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
