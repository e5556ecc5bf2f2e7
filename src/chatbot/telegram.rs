//! Telegram client using teloxide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatPermissions, MessageId, ReplyParameters};
use tracing::{info, warn};

use crate::chatbot::message::truncate_safe;
use crate::error::BotError;

/// Telegram refuses longer messages.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// The chat actions the engine performs.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Send `text` as a reply to `reply_to_message_id`.
    async fn send_reply(&self, chat_id: i64, text: &str, reply_to_message_id: i64) -> Result<(), BotError>;

    /// Best effort; failures are only logged.
    async fn send_action(&self, chat_id: i64, action: ChatAction);

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), BotError>;

    async fn mute_user(&self, chat_id: i64, user_id: i64, until: DateTime<Utc>) -> Result<(), BotError>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    /// Split into several messages if `text` is too long.
    async fn send_reply(&self, chat_id: i64, text: &str, reply_to_message_id: i64) -> Result<(), BotError> {
        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            self.bot
                .send_message(ChatId(chat_id), chunk)
                .reply_parameters(ReplyParameters::new(MessageId(reply_to_message_id as i32)))
                .await
                .map_err(|e| platform_failure("send message", e))?;
        }
        Ok(())
    }

    /// Show "typing…" / "recording video…" in the chat header.
    async fn send_action(&self, chat_id: i64, action: ChatAction) {
        if let Err(e) = self.bot.send_chat_action(ChatId(chat_id), action).await {
            warn!("Failed to send chat action: {e}");
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), BotError> {
        info!("🗑️ Deleting message {} in chat {}", message_id, chat_id);

        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map_err(|e| platform_failure("delete message", e))?;

        Ok(())
    }

    /// Strip all permissions from a user until `until`.
    async fn mute_user(&self, chat_id: i64, user_id: i64, until: DateTime<Utc>) -> Result<(), BotError> {
        info!("🔇 Muting user {} in chat {} until {}", user_id, chat_id, until);

        self.bot
            .restrict_chat_member(ChatId(chat_id), UserId(user_id as u64), ChatPermissions::empty())
            .until_date(until)
            .await
            .map_err(|e| platform_failure("mute user", e))?;

        Ok(())
    }
}

fn platform_failure(action: &str, e: teloxide::RequestError) -> BotError {
    let err = BotError::PlatformActionFailure(format!("{action}: {e}"));
    warn!("{err}");
    err
}

/// Split text into chunks of at most `max_len` bytes, preferring line breaks.
pub fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > max_len {
        let window = truncate_safe(rest, max_len);
        let cut = match window.rfind('\n') {
            Some(pos) if pos > 0 => pos + 1,
            _ => window.len(),
        };
        // A single char wider than max_len; take it whole rather than loop forever.
        let cut = if cut == 0 {
            rest.chars().next().map_or(rest.len(), char::len_utf8)
        } else {
            cut
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}
