//! Chatbot engine: moderation, history and completion for each message.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use teloxide::types::ChatAction;
use tracing::{error, info, warn};

use crate::chatbot::commands::{self, Command};
use crate::chatbot::message::IncomingMessage;
use crate::chatbot::state::{ChatState, Verdict};
use crate::chatbot::telegram::ChatPlatform;
use crate::chatbot::transcript::{find_video_links, TranscriptFetcher};
use crate::classifier::{classify, Classification};
use crate::completion::Client as CompletionClient;
use crate::settings::GroupSettings;

/// Chatbot configuration.
#[derive(Debug, Clone)]
pub struct ChatbotConfig {
    pub bot_username: Option<String>,
    pub owner_ids: Vec<i64>,
    pub history_capacity: usize,
    pub group_idle: Duration,
    pub sweep_interval: StdDuration,
    pub mute_duration: Duration,
    pub spam_detection: bool,
    /// Ask the model to confirm before punishing a flagged message.
    pub llm_spam_check: bool,
    pub dry_run: bool,
    pub personality: Option<String>,
}

impl Default for ChatbotConfig {
    fn default() -> Self {
        Self {
            bot_username: None,
            owner_ids: Vec::new(),
            history_capacity: 50,
            group_idle: Duration::hours(24),
            sweep_interval: StdDuration::from_secs(600),
            mute_duration: Duration::minutes(60),
            spam_detection: true,
            llm_spam_check: true,
            dry_run: false,
            personality: None,
        }
    }
}

impl ChatbotConfig {
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_ids.contains(&user_id)
    }
}

/// The chatbot engine.
pub struct ChatbotEngine {
    config: ChatbotConfig,
    state: Arc<ChatState>,
    telegram: Arc<dyn ChatPlatform>,
    completion: CompletionClient,
    transcripts: TranscriptFetcher,
    system_prompt: String,
}

impl ChatbotEngine {
    pub fn new(
        config: ChatbotConfig,
        telegram: Arc<dyn ChatPlatform>,
        completion: CompletionClient,
        transcripts: TranscriptFetcher,
    ) -> Self {
        let state = ChatState::new(
            config.history_capacity,
            GroupSettings {
                spam_detection: config.spam_detection,
            },
        );
        let system_prompt = system_prompt(&config);

        Self {
            config,
            state: Arc::new(state),
            telegram,
            completion,
            transcripts,
            system_prompt,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    /// Spawn the periodic sweep that evicts idle groups.
    pub fn start_sweeper(&self) {
        let state = self.state.clone();
        let group_idle = self.config.group_idle;
        let every = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                state.sweep(group_idle, Utc::now());
            }
        });
    }

    /// Handle one incoming message end to end.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        let bot_username = self.config.bot_username.as_deref();

        if msg.text.starts_with('/') {
            if let Some(command) = commands::parse(&msg.text, bot_username) {
                self.handle_command(&msg, command).await;
            }
            return;
        }

        if !self.config.is_owner(msg.user_id) && !self.moderate(&msg).await {
            return;
        }

        let Some(prompt) = msg.prompt_for(bot_username) else {
            return;
        };

        let prompt = if find_video_links(&prompt).is_empty() {
            prompt
        } else {
            self.telegram.send_action(msg.chat_id, ChatAction::RecordVideo).await;
            self.transcripts.substitute(&prompt).await
        };

        self.telegram.send_action(msg.chat_id, ChatAction::Typing).await;
        let reply = self.respond(&msg, &prompt).await;

        if let Err(e) = self.telegram.send_reply(msg.chat_id, &reply, msg.message_id).await {
            warn!("Reply to {} in chat {} not delivered: {e}", msg.username, msg.chat_id);
        }
    }

    /// Run moderation. Returns false if the message was dealt with and
    /// must not go further.
    async fn moderate(&self, msg: &IncomingMessage) -> bool {
        match self.state.moderate(msg, Utc::now()) {
            Verdict::Clean => true,
            Verdict::Muted => {
                info!("Suppressing message from muted user {} in chat {}", msg.user_id, msg.chat_id);
                self.remove_message(msg).await;
                false
            }
            Verdict::Suspicious(signals) => {
                info!("🚩 Message from {} ({}) flagged: {:?}", msg.username, msg.user_id, signals);
                if self.confirm_spam(&msg.text).await {
                    self.punish(msg).await;
                    false
                } else {
                    true
                }
            }
        }
    }

    async fn confirm_spam(&self, text: &str) -> bool {
        if !self.config.llm_spam_check {
            return true;
        }
        match classify(text, &self.completion).await {
            Ok(Classification::Spam) => {
                info!("Classifier: spam");
                true
            }
            Ok(Classification::NotSpam) => {
                info!("Classifier: not spam");
                false
            }
            Err(e) => {
                warn!("Classification error: {e}");
                false
            }
        }
    }

    async fn punish(&self, msg: &IncomingMessage) {
        let now = Utc::now();
        let until = self
            .state
            .mutes
            .mute(msg.chat_id, msg.user_id, self.config.mute_duration, now);

        self.remove_message(msg).await;

        if self.config.dry_run {
            info!("[DRY RUN] Would mute {} until {}", msg.username, until);
        } else if let Err(e) = self.telegram.mute_user(msg.chat_id, msg.user_id, until).await {
            warn!("Mute of {} not applied: {e}", msg.username);
        }
    }

    async fn remove_message(&self, msg: &IncomingMessage) {
        if self.config.dry_run {
            info!("[DRY RUN] Would delete message {}", msg.message_id);
        } else if let Err(e) = self.telegram.delete_message(msg.chat_id, msg.message_id).await {
            warn!("Delete of message {} failed: {e}", msg.message_id);
        }
    }

    /// Append the prompt, ask for a completion and append the reply.
    /// Failures come back as the user-facing error text.
    async fn respond(&self, msg: &IncomingMessage, prompt: &str) -> String {
        let key = msg.conversation_key();
        let history = self.state.push_prompt(key, prompt, Utc::now());

        match self.completion.complete(&self.system_prompt, &history).await {
            Ok(reply) if !reply.trim().is_empty() => {
                self.state.push_reply(key, &reply, Utc::now());
                reply
            }
            Ok(_) => {
                warn!("Empty completion for chat {}", msg.chat_id);
                "I have nothing to say to that.".to_string()
            }
            Err(e) => {
                error!("Completion failed for chat {}: {e}", msg.chat_id);
                e.user_message().to_string()
            }
        }
    }

    async fn handle_command(&self, msg: &IncomingMessage, command: Command) {
        let reply = command_reply(&self.config, &self.state, msg, command);
        if let Err(e) = self.telegram.send_reply(msg.chat_id, &reply, msg.message_id).await {
            warn!("Command reply not delivered: {e}");
        }
    }
}

/// Apply a command to the state and produce the reply text.
pub fn command_reply(config: &ChatbotConfig, state: &ChatState, msg: &IncomingMessage, command: Command) -> String {
    match command {
        Command::Start => "Hello! I'm your AI assistant. Just send me a message to chat.".to_string(),
        Command::Help => commands::help_text(),
        Command::Reset => {
            state.conversations.clear(msg.conversation_key());
            info!("Conversation {:?} reset by {}", msg.conversation_key(), msg.user_id);
            "Conversation cleared.".to_string()
        }
        Command::Spam(arg) => {
            if msg.is_private {
                return "Spam detection only applies to groups.".to_string();
            }
            if !config.is_owner(msg.user_id) {
                return "Only the bot owner can change this.".to_string();
            }
            match commands::parse_toggle(&arg) {
                Some(enabled) => {
                    state.settings.set_spam_detection(msg.chat_id, enabled);
                    info!("Spam detection in chat {} set to {}", msg.chat_id, enabled);
                    format!("Spam detection is now {}.", if enabled { "on" } else { "off" })
                }
                None => {
                    let current = state.settings.get(msg.chat_id).spam_detection;
                    format!(
                        "Spam detection is {}. Use /spam on or /spam off.",
                        if current { "on" } else { "off" }
                    )
                }
            }
        }
    }
}

/// Generate system prompt.
pub fn system_prompt(config: &ChatbotConfig) -> String {
    let identity = match (&config.personality, &config.bot_username) {
        (Some(p), _) => p.clone(),
        (None, Some(u)) => format!("You are @{u}, an AI assistant on Telegram."),
        (None, None) => "You are an AI assistant on Telegram.".to_string(),
    };

    format!(
        r#"{identity}

You talk with people in private messages and in group chats. In groups you only see messages addressed to you.

# How to answer
- Be clear and concise. Go into detail only when asked.
- Keep a friendly, professional and neutral tone.
- Answer the question that was asked. If it is unclear, ask for clarification instead of guessing.
- Don't flood the chat: one reply per message, and wait for the user before continuing.
- Stay away from sensitive or inappropriate topics.

# Videos
When a message contains a video transcript in place of a link, use it to answer. If it says no transcript was found, say you couldn't read the video."#
    )
}
