pub mod chatbot;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod error;
pub mod mute;
pub mod settings;
pub mod spam;
pub mod telegram_log;
