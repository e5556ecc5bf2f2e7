//! Chatbot module - relays Telegram messages to the completion service.

pub mod commands;
pub mod conversation;
pub mod engine;
pub mod message;
pub mod state;
pub mod telegram;
pub mod transcript;

#[cfg(test)]
mod tests;

pub use conversation::{ConversationKey, ConversationStore, Message, Role};
pub use engine::{system_prompt, ChatbotConfig, ChatbotEngine};
pub use message::IncomingMessage;
pub use state::{ChatState, Verdict};
pub use telegram::{ChatPlatform, TelegramClient};
pub use transcript::TranscriptFetcher;
