// Message model for the shared chat channel
// Documents live under `chats/{chatId}/messages`, append-only, ordered by
// timestamp ascending.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Sender id persisted for assistant-authored messages.
pub const AI_SENDER_ID: &str = "AI";

/// Placeholder text written while an AI reply is pending. Excluded from
/// every history handed to the gateway.
pub const THINKING_PLACEHOLDER: &str = "Thinking...";

/// Who authored a message. Persisted as the `senderId` string, with the
/// literal `"AI"` marking the assistant; logic only ever matches on the
/// variant, never the raw string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sender {
    Human(String),
    Assistant,
}

impl Sender {
    pub fn from_id(id: &str) -> Self {
        if id == AI_SENDER_ID {
            Sender::Assistant
        } else {
            Sender::Human(id.to_string())
        }
    }

    pub fn as_id(&self) -> &str {
        match self {
            Sender::Human(uid) => uid,
            Sender::Assistant => AI_SENDER_ID,
        }
    }

    /// Sole basis for self/other attribution when rendering a message list.
    pub fn is_viewer(&self, uid: &str) -> bool {
        matches!(self, Sender::Human(id) if id == uid)
    }
}

impl Serialize for Sender {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_id())
    }
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Ok(Sender::from_id(&id))
    }
}

/// A message in the shared channel of a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub message_id: String,
    #[serde(rename = "senderId")]
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub ai_insight_request: bool,
    #[serde(default)]
    pub ai_insight_response: String,
}

impl Message {
    /// A message typed by a human participant.
    pub fn human(uid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::Human(uid.into()),
            text: text.into(),
            timestamp: Utc::now(),
            ai_insight_request: false,
            ai_insight_response: String::new(),
        }
    }

    /// The pending placeholder written when an AI insight is requested.
    pub fn thinking() -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::Assistant,
            text: THINKING_PLACEHOLDER.to_string(),
            timestamp: Utc::now(),
            ai_insight_request: true,
            ai_insight_response: String::new(),
        }
    }

    /// An assistant reply carrying the insight text.
    pub fn assistant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            sender: Sender::Assistant,
            text: text.clone(),
            timestamp: Utc::now(),
            ai_insight_request: false,
            ai_insight_response: text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trip() {
        assert_eq!(Sender::from_id("AI"), Sender::Assistant);
        assert_eq!(
            Sender::from_id("user-42"),
            Sender::Human("user-42".to_string())
        );
        assert_eq!(Sender::Assistant.as_id(), "AI");
        assert_eq!(Sender::Human("u1".to_string()).as_id(), "u1");
    }

    #[test]
    fn test_is_viewer_only_for_matching_human() {
        assert!(Sender::Human("u1".to_string()).is_viewer("u1"));
        assert!(!Sender::Human("u1".to_string()).is_viewer("u2"));
        assert!(!Sender::Assistant.is_viewer("AI"));
    }

    #[test]
    fn test_sender_serde_as_sender_id() {
        let msg = Message::human("u1", "hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["senderId"], "u1");

        let ai = Message::thinking();
        let json = serde_json::to_value(&ai).unwrap();
        assert_eq!(json["senderId"], "AI");
        assert_eq!(json["text"], THINKING_PLACEHOLDER);
        assert_eq!(json["aiInsightRequest"], true);
    }
}
