use crate::chatbot::conversation::Message;
use crate::completion::Client;
use crate::error::BotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Spam,
    NotSpam,
}

const CLASSIFIER_PROMPT: &str = r#"You are a spam classifier for a Telegram group. Analyze the user's message and respond with exactly one word: SPAM or NOT_SPAM.

Spam includes:
- Flooding, repeated or copy-pasted text
- Mass mentions of other members
- Crypto/forex/investment scams and unsolicited promotions
- Phishing attempts and invite links to other groups/channels

NOT spam includes:
- Normal conversation, even if excited or in capitals
- Questions and answers
- Sharing relevant content

Respond with exactly one word: SPAM or NOT_SPAM"#;

/// Second opinion on a message the local heuristic flagged.
pub async fn classify(text: &str, client: &Client) -> Result<Classification, BotError> {
    let history = [Message::user(format!("Message to classify:\n\"{text}\""))];
    let reply = client.complete(CLASSIFIER_PROMPT, &history).await?;
    Ok(parse_verdict(&reply))
}

fn parse_verdict(reply: &str) -> Classification {
    let result = reply.trim().to_uppercase();

    if result.contains("SPAM") && !result.contains("NOT") {
        Classification::Spam
    } else {
        Classification::NotSpam
    }
}
