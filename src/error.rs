use std::fmt;

/// Failures from the services the bot talks to.
///
/// None of these are fatal: every handler recovers locally and keeps the
/// dispatcher running for other conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotError {
    /// Completion or token endpoint unreachable, timed out or returned non-2xx.
    UpstreamUnavailable(String),
    /// Completion or token endpoint answered without the expected fields.
    MalformedUpstreamResponse(String),
    /// Transcript could not be fetched for a video.
    TranscriptUnavailable(String),
    /// Telegram rejected an action (send, delete, restrict).
    PlatformActionFailure(String),
}

impl BotError {
    /// Fixed text shown to the user in place of a completion.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "API request failed.",
            Self::MalformedUpstreamResponse(_) => "Unexpected API response format.",
            Self::TranscriptUnavailable(_) => crate::chatbot::transcript::NO_TRANSCRIPT,
            Self::PlatformActionFailure(_) => "Something went wrong, please try again.",
        }
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamUnavailable(e) => write!(f, "upstream unavailable: {e}"),
            Self::MalformedUpstreamResponse(e) => write!(f, "malformed upstream response: {e}"),
            Self::TranscriptUnavailable(e) => write!(f, "transcript unavailable: {e}"),
            Self::PlatformActionFailure(e) => write!(f, "platform action failed: {e}"),
        }
    }
}

impl std::error::Error for BotError {}
