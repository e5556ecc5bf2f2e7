use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatKind, MessageEntityKind};
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use askllm::chatbot::{ChatbotConfig, ChatbotEngine, IncomingMessage, TelegramClient, TranscriptFetcher};
use askllm::completion::Client as CompletionClient;
use askllm::config::Config;
use askllm::telegram_log;

struct BotState {
    config: Config,
    chatbot: ChatbotEngine,
    bot_user_id: UserId,
    bot_username: Option<String>,
}

impl BotState {
    async fn new(config: Config, bot: &Bot) -> Result<Self, String> {
        let (bot_user_id, bot_username) = match bot.get_me().await {
            Ok(me) => {
                info!("Bot user ID: {}, username: @{}", me.id, me.username());
                (me.id, Some(me.username().to_string()))
            }
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                (UserId(0), None)
            }
        };

        let completion = CompletionClient::new(&config.completion_base_url, &config.model, config.request_timeout)
            .map_err(|e| format!("Failed to build completion client: {e}"))?;
        let transcripts = TranscriptFetcher::new(config.transcripts_enabled, config.request_timeout)
            .map_err(|e| format!("Failed to build transcript client: {e}"))?;

        let chatbot_config = ChatbotConfig {
            bot_username: bot_username.clone(),
            owner_ids: config.owner_ids.iter().map(|id| id.0 as i64).collect(),
            history_capacity: config.history_capacity,
            group_idle: config.group_idle,
            sweep_interval: config.sweep_interval,
            mute_duration: config.mute_duration,
            spam_detection: config.spam_detection,
            llm_spam_check: config.llm_spam_check,
            dry_run: config.dry_run,
            personality: config.personality.clone(),
        };

        let telegram = Arc::new(TelegramClient::new(bot.clone()));
        let chatbot = ChatbotEngine::new(chatbot_config, telegram, completion, transcripts);
        chatbot.start_sweeper();

        Ok(Self {
            config,
            chatbot,
            bot_user_id,
            bot_username,
        })
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "askllm.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "askllm.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id, tracing::Level::INFO);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🎊 Starting askllm...");
    info!("Loaded config from {config_path}");
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }

    let state = match BotState::new(config, &bot).await {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_new_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_new_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let is_private = matches!(msg.chat.kind, ChatKind::Private(_));

    if !is_private && !state.config.is_group_allowed(msg.chat.id) {
        return Ok(());
    }

    let Some(incoming) = telegram_to_incoming(&msg, &state) else {
        return Ok(());
    };

    let text_preview: String = incoming.text.chars().take(100).collect();
    info!(
        "📨 {} from {} ({}) in {}: \"{text_preview}\"",
        if is_private { "DM" } else { "Message" },
        incoming.username,
        incoming.user_id,
        incoming.chat_id
    );

    state.chatbot.handle_message(incoming).await;
    Ok(())
}

fn telegram_to_incoming(msg: &Message, state: &BotState) -> Option<IncomingMessage> {
    let user = msg.from.as_ref()?;
    let text = msg.text()?;

    let username = user
        .username
        .clone()
        .unwrap_or_else(|| user.first_name.clone());

    let mentions_bot = msg.parse_entities().is_some_and(|entities| {
        entities.iter().any(|entity| match entity.kind() {
            MessageEntityKind::Mention => state
                .bot_username
                .as_deref()
                .is_some_and(|name| entity.text().trim_start_matches('@').eq_ignore_ascii_case(name)),
            MessageEntityKind::TextMention { user } => user.id == state.bot_user_id,
            _ => false,
        })
    });

    let replies_to_bot = msg
        .reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .is_some_and(|u| u.id == state.bot_user_id);

    Some(IncomingMessage {
        message_id: msg.id.0 as i64,
        chat_id: msg.chat.id.0,
        user_id: user.id.0 as i64,
        username,
        is_private: matches!(msg.chat.kind, ChatKind::Private(_)),
        text: text.to_string(),
        mentions_bot,
        replies_to_bot,
    })
}
