//! Scenario tests for the chatbot state: moderation, history and commands
//! working together the way the engine drives them.

use chrono::{Duration, Utc};

use super::commands::Command;
use super::engine::command_reply;
use super::*;
use crate::settings::GroupSettings;
use crate::spam::SpamSignal;

fn state() -> ChatState {
    ChatState::new(10, GroupSettings::default())
}

fn config() -> ChatbotConfig {
    ChatbotConfig {
        bot_username: Some("askllmbot".to_string()),
        owner_ids: vec![1],
        ..ChatbotConfig::default()
    }
}

fn group_msg(chat_id: i64, user_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        message_id: 1,
        chat_id,
        user_id,
        username: format!("user{user_id}"),
        is_private: false,
        text: text.to_string(),
        mentions_bot: false,
        replies_to_bot: false,
    }
}

fn dm(user_id: i64, text: &str) -> IncomingMessage {
    IncomingMessage {
        is_private: true,
        chat_id: user_id,
        ..group_msg(user_id, user_id, text)
    }
}

// =============================================================================
// MODERATION
// =============================================================================

mod moderation {
    use super::*;

    #[test]
    fn test_clean_group_message() {
        let state = state();
        assert_eq!(state.moderate(&group_msg(-1, 5, "hello friend"), Utc::now()), Verdict::Clean);
    }

    #[test]
    fn test_shouting_is_suspicious() {
        let state = state();
        assert_eq!(
            state.moderate(&group_msg(-1, 5, "AAAAAAAAAAAAAAAA"), Utc::now()),
            Verdict::Suspicious(vec![SpamSignal::Shouting])
        );
    }

    #[test]
    fn test_private_messages_are_not_scored() {
        let state = state();
        assert_eq!(state.moderate(&dm(5, "AAAAAAAAAAAAAAAA"), Utc::now()), Verdict::Clean);
        assert_eq!(state.spam.tracked(), 0);
    }

    #[test]
    fn test_muted_user_is_suppressed_until_expiry() {
        let state = state();
        let now = Utc::now();
        state.mutes.mute(-1, 5, Duration::minutes(30), now);

        let msg = group_msg(-1, 5, "hello friend");
        assert_eq!(state.moderate(&msg, now + Duration::minutes(1)), Verdict::Muted);
        assert_eq!(state.moderate(&msg, now + Duration::minutes(31)), Verdict::Clean);
        assert!(state.mutes.is_empty());

        // Mute is per chat
        state.mutes.mute(-1, 5, Duration::minutes(30), now);
        assert_eq!(state.moderate(&group_msg(-2, 5, "hello friend"), now), Verdict::Clean);
    }

    #[test]
    fn test_flood_of_six_messages() {
        let state = state();
        let start = Utc::now();
        let msg = group_msg(-1, 5, "hello friend");
        for i in 0..5 {
            assert_eq!(state.moderate(&msg, start + Duration::milliseconds(100 * i)), Verdict::Clean);
        }
        assert_eq!(
            state.moderate(&msg, start + Duration::milliseconds(500)),
            Verdict::Suspicious(vec![SpamSignal::Flooding])
        );
    }

    #[test]
    fn test_disabling_detection_is_per_chat() {
        let state = state();
        let now = Utc::now();
        state.settings.set_spam_detection(-1, false);

        assert_eq!(state.moderate(&group_msg(-1, 5, "AAAAAAAAAAAAAAAA"), now), Verdict::Clean);
        assert!(matches!(
            state.moderate(&group_msg(-2, 5, "AAAAAAAAAAAAAAAA"), now),
            Verdict::Suspicious(_)
        ));
    }
}

// =============================================================================
// HISTORY
// =============================================================================

mod history {
    use super::*;

    #[test]
    fn test_prompt_and_reply_recorded() {
        let state = state();
        let key = ConversationKey::Private(5);
        let now = Utc::now();

        let sent = state.push_prompt(key, "what is rust?", now);
        assert_eq!(sent, vec![Message::user("what is rust?")]);

        state.push_reply(key, "A language.", now);
        let history = state.conversations.history(key);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[test]
    fn test_failed_completion_keeps_prompt() {
        let state = state();
        let key = ConversationKey::Group(-1);
        let now = Utc::now();

        state.push_prompt(key, "first", now);
        // no reply recorded
        let sent = state.push_prompt(key, "second", now);
        assert_eq!(sent, vec![Message::user("first"), Message::user("second")]);
    }

    #[test]
    fn test_history_is_capped() {
        let state = state();
        let key = ConversationKey::Group(-1);
        let now = Utc::now();
        for i in 0..25 {
            state.push_prompt(key, &format!("q{i}"), now);
        }
        let history = state.conversations.history(key);
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().content, "q15");
        assert_eq!(history.last().unwrap().content, "q24");
    }

    #[test]
    fn test_sweep_evicts_only_idle_groups() {
        let state = state();
        let start = Utc::now();
        state.push_prompt(ConversationKey::Group(-1), "stale", start);
        state.push_prompt(ConversationKey::Group(-2), "busy", start + Duration::hours(7));
        state.push_prompt(ConversationKey::Private(3), "dm", start);

        state.sweep(Duration::hours(8), start + Duration::hours(9));

        assert!(state.conversations.history(ConversationKey::Group(-1)).is_empty());
        assert_eq!(state.conversations.history(ConversationKey::Group(-2)).len(), 1);
        assert_eq!(state.conversations.history(ConversationKey::Private(3)).len(), 1);
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

mod command_handling {
    use super::*;

    #[test]
    fn test_reset_clears_callers_conversation() {
        let state = state();
        let config = config();
        let now = Utc::now();
        state.push_prompt(ConversationKey::Private(5), "hi", now);
        state.push_prompt(ConversationKey::Group(-1), "hi all", now);

        command_reply(&config, &state, &dm(5, "/reset"), Command::Reset);

        assert!(state.conversations.history(ConversationKey::Private(5)).is_empty());
        assert_eq!(state.conversations.history(ConversationKey::Group(-1)).len(), 1);
    }

    #[test]
    fn test_spam_toggle_requires_owner() {
        let state = state();
        let config = config();

        let reply = command_reply(&config, &state, &group_msg(-1, 5, "/spam off"), Command::Spam("off".into()));
        assert!(reply.contains("owner"));
        assert!(state.settings.get(-1).spam_detection);

        let reply = command_reply(&config, &state, &group_msg(-1, 1, "/spam off"), Command::Spam("off".into()));
        assert!(reply.contains("off"));
        assert!(!state.settings.get(-1).spam_detection);
        assert!(state.settings.get(-2).spam_detection);
    }

    #[test]
    fn test_spam_toggle_without_argument_reports_state() {
        let state = state();
        let reply = command_reply(&config(), &state, &group_msg(-1, 1, "/spam"), Command::Spam(String::new()));
        assert!(reply.contains("is on"));
    }

    #[test]
    fn test_spam_toggle_in_dm() {
        let state = state();
        let reply = command_reply(&config(), &state, &dm(1, "/spam off"), Command::Spam("off".into()));
        assert!(reply.contains("groups"));
    }
}

// =============================================================================
// SYSTEM PROMPT
// =============================================================================

mod prompt {
    use super::*;

    #[test]
    fn test_prompt_names_bot() {
        let prompt = system_prompt(&config());
        assert!(prompt.starts_with("You are @askllmbot"));
    }

    #[test]
    fn test_personality_overrides_identity() {
        let config = ChatbotConfig {
            personality: Some("You are Ferris, a friendly crab.".to_string()),
            ..config()
        };
        let prompt = system_prompt(&config);
        assert!(prompt.starts_with("You are Ferris"));
        assert!(!prompt.contains("@askllmbot"));
    }
}

// =============================================================================
// ENGINE
// =============================================================================

mod engine_flow {
    use std::sync::{Arc, Mutex};
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::DateTime;
    use serde_json::json;
    use teloxide::types::ChatAction;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::chatbot::telegram::ChatPlatform;
    use crate::completion::Client as CompletionClient;
    use crate::error::BotError;

    const SHOUT: &str = "AAAAAAAAAAAAAAAA";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Reply(i64, String),
        Delete(i64, i64),
        Mute(i64, i64),
    }

    #[derive(Default)]
    struct RecordingPlatform {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingPlatform {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatPlatform for RecordingPlatform {
        async fn send_reply(&self, chat_id: i64, text: &str, _reply_to: i64) -> Result<(), BotError> {
            self.calls.lock().unwrap().push(Call::Reply(chat_id, text.to_string()));
            Ok(())
        }

        async fn send_action(&self, _chat_id: i64, _action: ChatAction) {}

        async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), BotError> {
            self.calls.lock().unwrap().push(Call::Delete(chat_id, message_id));
            Ok(())
        }

        async fn mute_user(&self, chat_id: i64, user_id: i64, _until: DateTime<Utc>) -> Result<(), BotError> {
            self.calls.lock().unwrap().push(Call::Mute(chat_id, user_id));
            Ok(())
        }
    }

    fn engine(config: ChatbotConfig, base_url: &str) -> (ChatbotEngine, Arc<RecordingPlatform>) {
        let platform = Arc::new(RecordingPlatform::default());
        let completion = CompletionClient::new(base_url, "gpt-4o-mini", StdDuration::from_secs(5)).unwrap();
        let transcripts = TranscriptFetcher::new(false, StdDuration::from_secs(1)).unwrap();
        let engine = ChatbotEngine::new(config, platform.clone(), completion, transcripts);
        (engine, platform)
    }

    fn moderation_config(llm_spam_check: bool, dry_run: bool) -> ChatbotConfig {
        ChatbotConfig {
            llm_spam_check,
            dry_run,
            ..config()
        }
    }

    fn choice(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choice": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    async fn token_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/get-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "tok" })))
            .mount(&server)
            .await;
        server
    }

    /// The classifier gets `verdict`, every other completion gets `reply`.
    async fn completion_server(verdict: &str, reply: ResponseTemplate) -> MockServer {
        let server = token_server().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_string_contains("spam classifier"))
            .respond_with(choice(verdict))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(reply)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_confirmed_spam_is_deleted_and_muted() {
        let server = completion_server("SPAM", choice("unused")).await;
        let (engine, platform) = engine(moderation_config(true, false), &server.uri());

        engine.handle_message(group_msg(-1, 5, SHOUT)).await;

        assert_eq!(platform.calls(), vec![Call::Delete(-1, 1), Call::Mute(-1, 5)]);
        assert!(engine.state().mutes.is_muted(-1, 5, Utc::now()));

        // Anything else the muted user sends is removed
        engine.handle_message(group_msg(-1, 5, "sorry")).await;
        assert_eq!(platform.calls().len(), 3);
        assert_eq!(platform.calls()[2], Call::Delete(-1, 1));
    }

    #[tokio::test]
    async fn test_classifier_can_clear_a_flag() {
        let server = completion_server("NOT_SPAM", choice("unused")).await;
        let (engine, platform) = engine(moderation_config(true, false), &server.uri());

        engine.handle_message(group_msg(-1, 5, SHOUT)).await;

        assert!(platform.calls().is_empty());
        assert!(engine.state().mutes.is_empty());
    }

    #[tokio::test]
    async fn test_classifier_error_lets_message_through() {
        // No mocks mounted: the token endpoint answers 404
        let server = MockServer::start().await;
        let (engine, platform) = engine(moderation_config(true, false), &server.uri());

        engine.handle_message(group_msg(-1, 5, SHOUT)).await;

        assert!(platform.calls().is_empty());
        assert!(!engine.state().mutes.is_muted(-1, 5, Utc::now()));
    }

    #[tokio::test]
    async fn test_flag_is_punished_directly_without_escalation() {
        let server = MockServer::start().await;
        let (engine, platform) = engine(moderation_config(false, false), &server.uri());

        engine.handle_message(group_msg(-1, 5, SHOUT)).await;

        assert_eq!(platform.calls(), vec![Call::Delete(-1, 1), Call::Mute(-1, 5)]);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_only_logs() {
        let server = MockServer::start().await;
        let (engine, platform) = engine(moderation_config(false, true), &server.uri());

        engine.handle_message(group_msg(-1, 5, SHOUT)).await;
        engine.handle_message(group_msg(-1, 5, "sorry")).await;

        assert!(platform.calls().is_empty());
        assert!(engine.state().mutes.is_muted(-1, 5, Utc::now()));
    }

    #[tokio::test]
    async fn test_owner_is_never_moderated() {
        let server = MockServer::start().await;
        let (engine, platform) = engine(moderation_config(false, false), &server.uri());

        engine.handle_message(group_msg(-1, 1, SHOUT)).await;

        assert!(platform.calls().is_empty());
        assert!(engine.state().mutes.is_empty());
    }

    #[tokio::test]
    async fn test_dm_reply_is_recorded() {
        let server = completion_server("NOT_SPAM", choice("A language.")).await;
        let (engine, platform) = engine(config(), &server.uri());

        engine.handle_message(dm(5, "what is rust?")).await;

        assert_eq!(platform.calls(), vec![Call::Reply(5, "A language.".into())]);
        assert_eq!(
            engine.state().conversations.history(ConversationKey::Private(5)),
            vec![Message::user("what is rust?"), Message::assistant("A language.")]
        );
    }

    #[tokio::test]
    async fn test_addressed_group_message_uses_group_history() {
        let server = completion_server("NOT_SPAM", choice("hello")).await;
        let (engine, platform) = engine(config(), &server.uri());

        engine.handle_message(group_msg(-1, 5, "@askllmbot hi there")).await;

        assert_eq!(platform.calls(), vec![Call::Reply(-1, "hello".into())]);
        assert_eq!(
            engine.state().conversations.history(ConversationKey::Group(-1))[0],
            Message::user("hi there")
        );
    }

    #[tokio::test]
    async fn test_unavailable_upstream_keeps_prompt() {
        let server = completion_server("NOT_SPAM", ResponseTemplate::new(500)).await;
        let (engine, platform) = engine(config(), &server.uri());

        engine.handle_message(dm(5, "what is rust?")).await;

        assert_eq!(platform.calls(), vec![Call::Reply(5, "API request failed.".into())]);
        assert_eq!(
            engine.state().conversations.history(ConversationKey::Private(5)),
            vec![Message::user("what is rust?")]
        );
    }

    #[tokio::test]
    async fn test_malformed_upstream_keeps_prompt() {
        let server = completion_server(
            "NOT_SPAM",
            ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })),
        )
        .await;
        let (engine, platform) = engine(config(), &server.uri());

        engine.handle_message(dm(5, "what is rust?")).await;

        assert_eq!(platform.calls(), vec![Call::Reply(5, "Unexpected API response format.".into())]);
        assert_eq!(engine.state().conversations.history(ConversationKey::Private(5)).len(), 1);
    }
}
