//! Local spam heuristic: cheap structural checks run on every group message.
//!
//! A flagged message is only a candidate. The engine asks the classifier for
//! a second opinion before punishing anyone.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use regex::Regex;

use crate::settings::GroupSettings;

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@\w+").unwrap());

/// Which check fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamSignal {
    Flooding,
    CharacterNoise,
    RepeatedWords,
    Shouting,
    MassMention,
}

#[derive(Debug, Clone, Copy)]
pub struct SpamThresholds {
    /// Messages closer together than this count toward the flood counter.
    pub window: Duration,
    /// Flood when the counter goes above this.
    pub max_burst: u32,
    pub max_noise_ratio: f64,
    /// Words must be longer than this to count as repeated.
    pub min_repeat_word_len: usize,
    pub max_word_repeats: usize,
    /// All-caps text must be longer than this to count as shouting.
    pub min_shout_len: usize,
    pub max_mentions: usize,
}

impl Default for SpamThresholds {
    fn default() -> Self {
        Self {
            window: Duration::seconds(2),
            max_burst: 5,
            max_noise_ratio: 0.3,
            min_repeat_word_len: 3,
            max_word_repeats: 3,
            min_shout_len: 15,
            max_mentions: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SpamCounter {
    count: u32,
    last_seen: DateTime<Utc>,
}

pub struct SpamHeuristic {
    thresholds: SpamThresholds,
    counters: DashMap<(i64, i64), SpamCounter>,
}

impl SpamHeuristic {
    pub fn new(thresholds: SpamThresholds) -> Self {
        Self {
            thresholds,
            counters: DashMap::new(),
        }
    }

    /// True if any check fires. Always false when spam detection is off for the chat.
    pub fn score(&self, chat_id: i64, user_id: i64, text: &str, settings: &GroupSettings, now: DateTime<Utc>) -> bool {
        !self.evaluate(chat_id, user_id, text, settings, now).is_empty()
    }

    /// Run every check and return the ones that fired.
    pub fn evaluate(
        &self,
        chat_id: i64,
        user_id: i64,
        text: &str,
        settings: &GroupSettings,
        now: DateTime<Utc>,
    ) -> Vec<SpamSignal> {
        if !settings.spam_detection {
            return Vec::new();
        }

        let t = &self.thresholds;
        let mut signals = Vec::new();

        if self.record_message(chat_id, user_id, now) > t.max_burst {
            signals.push(SpamSignal::Flooding);
        }
        if noise_ratio(text).is_some_and(|r| r > t.max_noise_ratio) {
            signals.push(SpamSignal::CharacterNoise);
        }
        if has_repeated_word(text, t.min_repeat_word_len, t.max_word_repeats) {
            signals.push(SpamSignal::RepeatedWords);
        }
        if is_shouting(text, t.min_shout_len) {
            signals.push(SpamSignal::Shouting);
        }
        if MENTION.find_iter(text).count() > t.max_mentions {
            signals.push(SpamSignal::MassMention);
        }

        signals
    }

    /// Bump the flood counter for (chat, user) and return its new value.
    fn record_message(&self, chat_id: i64, user_id: i64, now: DateTime<Utc>) -> u32 {
        let mut counter = self
            .counters
            .entry((chat_id, user_id))
            .or_insert(SpamCounter { count: 0, last_seen: now });

        if counter.count > 0 && now.signed_duration_since(counter.last_seen) < self.thresholds.window {
            counter.count += 1;
        } else {
            counter.count = 1;
        }
        counter.last_seen = now;
        counter.count
    }

    /// Drop counters whose window has lapsed; the next message would reset them anyway.
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let before = self.counters.len();
        let window = self.thresholds.window;
        self.counters
            .retain(|_, c| now.signed_duration_since(c.last_seen) < window);
        before.saturating_sub(self.counters.len())
    }

    pub fn tracked(&self) -> usize {
        self.counters.len()
    }
}

impl Default for SpamHeuristic {
    fn default() -> Self {
        Self::new(SpamThresholds::default())
    }
}

/// Share of characters that are not alphanumeric, whitespace included.
/// `None` for empty text.
fn noise_ratio(text: &str) -> Option<f64> {
    let total = text.chars().count();
    if total == 0 {
        return None;
    }
    let noisy = text.chars().filter(|c| !c.is_alphanumeric()).count();
    Some(noisy as f64 / total as f64)
}

/// Words are compared case-insensitively with surrounding punctuation
/// stripped, so "Buy," and "buy!" are the same word.
fn has_repeated_word(text: &str, min_len: usize, max_repeats: usize) -> bool {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text.split_whitespace() {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric());
        if word.chars().count() <= min_len {
            continue;
        }
        let count = counts.entry(word.to_lowercase()).or_insert(0);
        *count += 1;
        if *count > max_repeats {
            return true;
        }
    }
    false
}

fn is_shouting(text: &str, min_len: usize) -> bool {
    text.chars().count() > min_len
        && text.chars().any(char::is_alphabetic)
        && !text.chars().any(char::is_lowercase)
}
