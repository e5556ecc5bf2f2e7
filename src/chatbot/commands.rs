//! Slash commands understood by the bot.

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "say hello.")]
    Start,
    #[command(description = "show this text.")]
    Help,
    #[command(description = "forget this conversation.")]
    Reset,
    #[command(description = "turn spam detection on or off for this group (owners only).")]
    Spam(String),
}

/// Parse `text` as a command addressed to this bot. Commands meant for
/// another bot (`/help@otherbot`) and unknown commands give `None`.
pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Command> {
    Command::parse(text, bot_username.unwrap_or_default()).ok()
}

/// `on` / `off` argument of `/spam`.
pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "enable" | "true" | "1" => Some(true),
        "off" | "disable" | "false" | "0" => Some(false),
        _ => None,
    }
}

pub fn help_text() -> String {
    Command::descriptions().to_string()
}
