//! Client for the chat completion service.
//!
//! Each call first fetches a short-lived token, then posts the system prompt
//! followed by the conversation history.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chatbot::conversation::{Message, Role};
use crate::error::BotError;

pub struct Client {
    base_url: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    token: &'a str,
    model: &'a str,
    message: Vec<ApiMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choice: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
    }
}

impl Client {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http,
        })
    }

    /// Ask for a completion of `history`, preceded by `system`.
    pub async fn complete(&self, system: &str, history: &[Message]) -> Result<String, BotError> {
        let token = self.fetch_token().await?;

        let message = std::iter::once(ApiMessage {
            role: role_str(Role::System),
            content: system,
        })
        .chain(history.iter().map(|m| ApiMessage {
            role: role_str(m.role),
            content: &m.content,
        }))
        .collect();

        let request = ApiRequest {
            token: &token,
            model: &self.model,
            message,
            stream: false,
        };

        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(e.to_string()))?;

        debug!("Completion response status: {status}");

        if !status.is_success() {
            return Err(BotError::UpstreamUnavailable(format!("{status}: {body}")));
        }

        parse_completion(&body)
    }

    async fn fetch_token(&self) -> Result<String, BotError> {
        let response = self
            .http
            .get(format!("{}/v1/get-token", self.base_url))
            .send()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(format!("token: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BotError::UpstreamUnavailable(format!("token endpoint returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| BotError::UpstreamUnavailable(format!("token: {e}")))?;

        parse_token(&body)
    }
}

fn parse_token(body: &str) -> Result<String, BotError> {
    let parsed: TokenResponse = serde_json::from_str(body)
        .map_err(|e| BotError::MalformedUpstreamResponse(format!("token: {e}")))?;

    parsed
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BotError::MalformedUpstreamResponse("no token in response".into()))
}

fn parse_completion(body: &str) -> Result<String, BotError> {
    let parsed: ApiResponse = serde_json::from_str(body)
        .map_err(|e| BotError::MalformedUpstreamResponse(e.to_string()))?;

    parsed
        .choice
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .and_then(|m| m.content)
        .ok_or_else(|| BotError::MalformedUpstreamResponse("no choice content".into()))
}
