//! The session transcript: an append-only, chronologically ordered
//! sequence of chat messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Ai => write!(f, "ai"),
        }
    }
}

/// One transcript entry. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_sentiment: Option<String>,
}

impl ChatMessage {
    /// Build a user message with a fresh id and the current timestamp.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::User,
            text: text.into(),
            timestamp: Utc::now(),
            detected_sentiment: None,
        }
    }

    /// Build an AI message with a fresh id and the current timestamp.
    pub fn ai(text: impl Into<String>, detected_sentiment: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Ai,
            text: text.into(),
            timestamp: Utc::now(),
            detected_sentiment,
        }
    }
}

/// Append-only message sequence for one session. Insertion order is the
/// chronological order shown to the user; entries are never removed.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// The most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> &[ChatMessage] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_get_unique_ids() {
        let a = ChatMessage::user("hello");
        let b = ChatMessage::user("hello");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_last_n_shorter_than_transcript() {
        let mut t = Transcript::new();
        t.push(ChatMessage::user("one"));
        assert_eq!(t.last_n(4).len(), 1);
    }

    #[test]
    fn test_last_n_takes_most_recent() {
        let mut t = Transcript::new();
        for i in 0..6 {
            t.push(ChatMessage::user(format!("m{}", i)));
        }
        let tail = t.last_n(4);
        assert_eq!(tail.len(), 4);
        assert_eq!(tail[0].text, "m2");
        assert_eq!(tail[3].text, "m5");
    }

    #[test]
    fn test_sentiment_omitted_when_absent() {
        let msg = ChatMessage::ai("hi", None);
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("detectedSentiment").is_none());
        assert_eq!(json["sender"], "ai");
    }
}
