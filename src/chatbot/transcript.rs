//! YouTube transcript extraction.
//!
//! Links in a message are replaced by the video's caption text so the model
//! can answer questions about the video.

use std::sync::LazyLock;
use std::time::Duration;

use quick_xml::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use tracing::{info, warn};

use crate::error::BotError;

/// Substituted for a link when no transcript can be had.
pub const NO_TRANSCRIPT: &str = "No transcript found in the YouTube video";

static YOUTUBE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)([\w-]+)").unwrap()
});
static CAPTION_BASE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""captionTracks":\[\{"baseUrl":"((?:[^"\\]|\\.)*)""#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoLink {
    pub url: String,
    pub video_id: String,
}

pub fn find_video_links(text: &str) -> Vec<VideoLink> {
    YOUTUBE_LINK
        .captures_iter(text)
        .map(|c| VideoLink {
            url: c[0].to_string(),
            video_id: c[1].to_string(),
        })
        .collect()
}

pub struct TranscriptFetcher {
    http: reqwest::Client,
    enabled: bool,
}

impl TranscriptFetcher {
    pub fn new(enabled: bool, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, enabled })
    }

    /// Replace every video link in `text` with its transcript, or with
    /// [`NO_TRANSCRIPT`] when none is available.
    pub async fn substitute(&self, text: &str) -> String {
        let mut result = text.to_string();
        for link in find_video_links(text) {
            let transcript = match self.fetch(&link.video_id).await {
                Ok(t) => t,
                Err(e) => {
                    warn!("Transcript for {}: {e}", link.video_id);
                    NO_TRANSCRIPT.to_string()
                }
            };
            result = result.replace(&link.url, &transcript);
        }
        result
    }

    pub async fn fetch(&self, video_id: &str) -> Result<String, BotError> {
        if !self.enabled {
            return Err(BotError::TranscriptUnavailable("transcripts disabled".into()));
        }

        info!("📺 Fetching transcript for {}", video_id);

        let watch_url = format!("https://www.youtube.com/watch?v={}", urlencoding::encode(video_id));
        let page = self.get_text(&watch_url).await?;

        let track_url = caption_track_url(&page)
            .ok_or_else(|| BotError::TranscriptUnavailable("no caption tracks".into()))?;
        let xml = self.get_text(&track_url).await?;

        let transcript = parse_caption_xml(&xml)?;
        if transcript.is_empty() {
            return Err(BotError::TranscriptUnavailable("empty transcript".into()));
        }

        info!("📺 Transcript for {}: {} chars", video_id, transcript.len());
        Ok(transcript)
    }

    async fn get_text(&self, url: &str) -> Result<String, BotError> {
        let response = self
            .http
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| BotError::TranscriptUnavailable(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BotError::TranscriptUnavailable(format!(
                "YouTube returned status {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| BotError::TranscriptUnavailable(format!("read failed: {e}")))
    }
}

/// First caption track URL embedded in a watch page.
fn caption_track_url(page: &str) -> Option<String> {
    let raw = CAPTION_BASE_URL.captures(page)?.get(1)?.as_str();
    // Still JSON-escaped at this point (`\u0026` and friends).
    serde_json::from_str::<String>(&format!("\"{raw}\"")).ok()
}

/// Join the `<text>` nodes of a timedtext document into one line.
fn parse_caption_xml(xml: &str) -> Result<String, BotError> {
    let mut reader = Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"text" => current = Some(String::new()),
            Ok(Event::Text(e)) => {
                let Some(line) = current.as_mut() else { continue };
                let once = e.unescape().map_err(malformed_captions)?;
                // Caption text usually arrives escaped twice (`&amp;#39;`).
                match escape::unescape(&once) {
                    Ok(twice) => line.push_str(&twice),
                    Err(_) => line.push_str(&once),
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(line) = current.as_mut() {
                    line.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"text" => {
                if let Some(line) = current.take() {
                    let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
                    if !line.is_empty() {
                        lines.push(line);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed_captions(e)),
        }
    }

    Ok(lines.join(" "))
}

fn malformed_captions(e: impl std::fmt::Display) -> BotError {
    BotError::TranscriptUnavailable(format!("bad caption XML: {e}"))
}
