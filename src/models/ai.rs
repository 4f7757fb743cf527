// AI side-channel and global-request models
// Side-channel messages live under
// `chats/{chatId}/userAIChats/{userId}/aiMessages`, a private log per
// (chat, user) that never mixes with the shared message list. Global
// requests audit every AI invocation in the top-level `aiGlobalRequests`
// collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender of a private AI-channel entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AiSender {
    User,
    Ai,
}

/// One turn in a user's private conversation with the AI coach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConversationMessage {
    pub id: String,
    pub sender: AiSender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl AiConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: AiSender::User,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: AiSender::Ai,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Audit record of one AI invocation, independent of any chat's message
/// list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiGlobalRequest {
    pub request_id: String,
    pub user_id: String,
    pub query: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub related_chat_ids: Vec<String>,
}

impl AiGlobalRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>, chat_id: &str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            query: query.into(),
            timestamp: Utc::now(),
            response: String::new(),
            related_chat_ids: vec![chat_id.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_sender_serde_uppercase() {
        assert_eq!(serde_json::to_string(&AiSender::User).unwrap(), "\"USER\"");
        assert_eq!(serde_json::to_string(&AiSender::Ai).unwrap(), "\"AI\"");
        let parsed: AiSender = serde_json::from_str("\"USER\"").unwrap();
        assert_eq!(parsed, AiSender::User);
    }
}
