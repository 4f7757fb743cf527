// Chat and recent-chat models
// Chats live in the top-level `chats` collection; recent-chat summaries in
// `recentChats`, one document per chat keyed by the chat id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserProfile;

/// A conversation between participants.
///
/// This app only ever creates chats with one or two participants (a direct
/// chat, or a self/AI-only chat). Chats are never deleted or archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub chat_id: String,
    pub participants: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_name: Option<String>,
}

impl Chat {
    /// The participant that is not `uid`, if any.
    pub fn other_participant(&self, uid: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != uid)
    }
}

/// Inbox row for a chat, overwritten on every send so only the latest
/// message survives. `user` is the sender's denormalized profile — the row
/// as the other participant sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChatSummary {
    pub chat_id: String,
    pub user: UserProfile,
    pub last_message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_participant() {
        let chat = Chat {
            chat_id: "c1".to_string(),
            participants: vec!["a".to_string(), "b".to_string()],
            created_at: Utc::now(),
            updated_at: None,
            chat_name: None,
        };
        assert_eq!(chat.other_participant("a"), Some("b"));
        assert_eq!(chat.other_participant("b"), Some("a"));
    }

    #[test]
    fn test_other_participant_solo_chat() {
        let chat = Chat {
            chat_id: "c2".to_string(),
            participants: vec!["a".to_string()],
            created_at: Utc::now(),
            updated_at: None,
            chat_name: Some("Notes".to_string()),
        };
        assert_eq!(chat.other_participant("a"), None);
    }
}
