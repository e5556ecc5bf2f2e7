//! Tracing layer that mirrors bot activity into a Telegram chat.
//!
//! Warnings and errors go out immediately. Everything else at or above the
//! configured level is batched and flushed every few seconds.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::chatbot::message::truncate_safe;
use crate::chatbot::telegram::MAX_MESSAGE_LEN;

const FLUSH_EVERY: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;

enum LogLine {
    Urgent(String),
    Batched(String),
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
    min_level: Level,
}

impl TelegramLogLayer {
    /// Must be called from inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId, min_level: Level) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(bot, chat_id, rx));
        Self { tx, min_level }
    }
}

async fn forward(bot: Bot, chat_id: ChatId, mut rx: mpsc::UnboundedReceiver<LogLine>) {
    let mut batch: Vec<String> = Vec::new();
    let mut interval = tokio::time::interval(FLUSH_EVERY);

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(LogLine::Urgent(text)) => post(&bot, chat_id, &text).await,
                Some(LogLine::Batched(text)) => {
                    batch.push(text);
                    if batch.len() >= MAX_BATCH {
                        post(&bot, chat_id, &batch.join("\n")).await;
                        batch.clear();
                    }
                }
                None => break,
            },
            _ = interval.tick() => {
                if !batch.is_empty() {
                    post(&bot, chat_id, &batch.join("\n")).await;
                    batch.clear();
                }
            }
        }
    }
}

async fn post(bot: &Bot, chat_id: ChatId, text: &str) {
    // Leave room for the ellipsis.
    let limit = MAX_MESSAGE_LEN - 8;
    let text = if text.len() > limit {
        format!("{}...", truncate_safe(text, limit))
    } else {
        text.to_string()
    };
    // Logging from here would feed back into this layer.
    if let Err(e) = bot.send_message(chat_id, text).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

#[derive(Default)]
struct LineVisitor {
    line: String,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.line = format!("{value:?}{}", self.line);
        } else {
            self.line.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

fn classify_line(level: Level, line: String) -> LogLine {
    match level {
        Level::ERROR => LogLine::Urgent(format!("❌ {line}")),
        Level::WARN => LogLine::Urgent(format!("⚠️ {line}")),
        _ => LogLine::Batched(line),
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        // Lower levels compare greater (TRACE > DEBUG > INFO).
        if level > self.min_level {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        if self.tx.send(classify_line(level, visitor.line)).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
