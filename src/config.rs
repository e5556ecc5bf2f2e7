use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::{ChatId, UserId};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Users allowed to run admin commands such as /spam
    #[serde(default)]
    owner_ids: Vec<u64>,
    #[serde(default = "default_completion_base_url")]
    completion_base_url: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    /// Messages kept per conversation
    #[serde(default = "default_history_capacity")]
    history_capacity: usize,
    /// Group history is dropped after this many hours without activity
    #[serde(default = "default_group_idle_hours")]
    group_idle_hours: u32,
    #[serde(default = "default_sweep_interval_minutes")]
    sweep_interval_minutes: u32,
    /// Default for groups that never ran /spam
    #[serde(default = "default_true")]
    spam_detection: bool,
    #[serde(default = "default_true")]
    llm_spam_check: bool,
    #[serde(default = "default_mute_minutes")]
    mute_minutes: u32,
    #[serde(default = "default_true")]
    transcripts_enabled: bool,
    /// Empty means every group
    #[serde(default)]
    allowed_groups: Vec<i64>,
    #[serde(default)]
    dry_run: bool,
    log_chat_id: Option<i64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    /// Replaces the default identity line of the system prompt.
    personality: Option<String>,
}

fn default_completion_base_url() -> String {
    "https://api.h-s.site".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_history_capacity() -> usize {
    50
}

fn default_group_idle_hours() -> u32 {
    24
}

fn default_sweep_interval_minutes() -> u32 {
    10
}

fn default_mute_minutes() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

pub struct Config {
    pub telegram_bot_token: String,
    pub owner_ids: Vec<UserId>,
    pub completion_base_url: String,
    pub model: String,
    pub request_timeout: Duration,
    pub history_capacity: usize,
    pub group_idle: chrono::Duration,
    pub sweep_interval: Duration,
    pub spam_detection: bool,
    pub llm_spam_check: bool,
    pub mute_duration: chrono::Duration,
    pub transcripts_enabled: bool,
    pub allowed_groups: HashSet<ChatId>,
    pub dry_run: bool,
    pub log_chat_id: Option<ChatId>,
    /// Directory for logs.
    pub data_dir: PathBuf,
    pub personality: Option<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }

        let base_url = file.completion_base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Validation(
                "completion_base_url must start with http:// or https://".into()
            ));
        }

        for (name, value) in [
            ("history_capacity", file.history_capacity as u64),
            ("request_timeout_secs", file.request_timeout_secs),
            ("group_idle_hours", file.group_idle_hours.into()),
            ("sweep_interval_minutes", file.sweep_interval_minutes.into()),
            ("mute_minutes", file.mute_minutes.into()),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be at least 1")));
            }
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            owner_ids: file.owner_ids.into_iter().map(UserId).collect(),
            completion_base_url: base_url,
            model: file.model,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            history_capacity: file.history_capacity,
            group_idle: chrono::Duration::hours(file.group_idle_hours.into()),
            sweep_interval: Duration::from_secs(u64::from(file.sweep_interval_minutes) * 60),
            spam_detection: file.spam_detection,
            llm_spam_check: file.llm_spam_check,
            mute_duration: chrono::Duration::minutes(file.mute_minutes.into()),
            transcripts_enabled: file.transcripts_enabled,
            allowed_groups: file.allowed_groups.into_iter().map(ChatId).collect(),
            dry_run: file.dry_run,
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
            personality: file.personality,
        })
    }

    /// Groups outside a non-empty allow list are ignored.
    pub fn is_group_allowed(&self, chat_id: ChatId) -> bool {
        self.allowed_groups.is_empty() || self.allowed_groups.contains(&chat_id)
    }
}
