// History reconstruction for AI coaching requests
//
// Before calling the gateway we assemble two ordered lists from a chat's
// snapshots: the dialogue history (turns between the two human
// participants) and the coaching history (turns between the requesting
// user and the AI). Two policies exist; DualStream reads the shared
// message list and the private side-channel separately and is the default.
// SingleStream is the earlier variant that reads only the side-channel and
// assigns roles by index parity — it misattributes roles when two user
// turns occur back to back and is kept only for compatibility.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::{AiConversationMessage, AiSender, Message, Sender, THINKING_PLACEHOLDER};

/// Synthesized dialogue turn inserted by the single-stream policy where no
/// real "other" message exists.
pub const PLACEHOLDER_OTHER_RESPONSE: &str = "placeholder response";

/// Which reconstruction policy to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryPolicy {
    SingleStream,
    DualStream,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        HistoryPolicy::DualStream
    }
}

impl FromStr for HistoryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single_stream" | "single" => Ok(HistoryPolicy::SingleStream),
            "dual_stream" | "dual" => Ok(HistoryPolicy::DualStream),
            other => Err(format!("unknown history policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogueRole {
    User,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachingRole {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub role: DialogueRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingTurn {
    pub role: CoachingRole,
    pub content: String,
}

/// Request body the gateway expects. Contents are raw message text in
/// chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverseRequest {
    pub user_input: String,
    pub dialogue_history: Vec<DialogueTurn>,
    pub coaching_history: Vec<CoachingTurn>,
}

/// Build the gateway request from live snapshots.
///
/// `exclude_doc_id` is the id of the just-written "Thinking..." placeholder;
/// it is dropped from both histories by document identity.
pub fn build_history(
    policy: HistoryPolicy,
    requester_uid: &str,
    user_input: &str,
    chat_messages: &[Message],
    side_channel: &[AiConversationMessage],
    exclude_doc_id: &str,
) -> ConverseRequest {
    match policy {
        HistoryPolicy::DualStream => build_dual_stream(
            requester_uid,
            user_input,
            chat_messages,
            side_channel,
            exclude_doc_id,
        ),
        HistoryPolicy::SingleStream => {
            build_single_stream(user_input, side_channel, exclude_doc_id)
        }
    }
}

/// Dual-stream policy: dialogue from the shared message list, coaching from
/// the side-channel. Assistant messages never enter the dialogue history,
/// and the pending placeholder never enters either list.
fn build_dual_stream(
    requester_uid: &str,
    user_input: &str,
    chat_messages: &[Message],
    side_channel: &[AiConversationMessage],
    exclude_doc_id: &str,
) -> ConverseRequest {
    let mut dialogue_history = Vec::new();
    for message in chat_messages {
        if message.message_id == exclude_doc_id {
            continue;
        }
        match &message.sender {
            Sender::Human(uid) => {
                let role = if uid == requester_uid {
                    DialogueRole::User
                } else {
                    DialogueRole::Other
                };
                dialogue_history.push(DialogueTurn {
                    role,
                    content: message.text.clone(),
                });
            }
            // AI insights are not part of the human dialogue
            Sender::Assistant => {}
        }
    }

    let mut coaching_history = Vec::new();
    for entry in side_channel {
        if entry.id == exclude_doc_id || entry.text == THINKING_PLACEHOLDER {
            continue;
        }
        let role = match entry.sender {
            AiSender::User => CoachingRole::User,
            AiSender::Ai => CoachingRole::Ai,
        };
        coaching_history.push(CoachingTurn {
            role,
            content: entry.text.clone(),
        });
    }

    // The outgoing message may already be in the snapshot (read back after
    // its own write); it must appear exactly once.
    let already_last = coaching_history
        .last()
        .map(|turn| turn.role == CoachingRole::User && turn.content == user_input)
        .unwrap_or(false);
    if !already_last {
        coaching_history.push(CoachingTurn {
            role: CoachingRole::User,
            content: user_input.to_string(),
        });
    }

    ConverseRequest {
        user_input: user_input.to_string(),
        dialogue_history,
        coaching_history,
    }
}

/// Single-stream policy: alternate side-channel entries into dialogue and
/// coaching roles by original index parity. Parity is taken over the raw
/// snapshot, so the skipped placeholder still occupies its position.
fn build_single_stream(
    user_input: &str,
    side_channel: &[AiConversationMessage],
    exclude_doc_id: &str,
) -> ConverseRequest {
    let mut dialogue_history = Vec::new();
    let mut coaching_history = Vec::new();

    for (index, entry) in side_channel.iter().enumerate() {
        if entry.id == exclude_doc_id {
            continue;
        }

        if index % 2 == 0 {
            dialogue_history.push(DialogueTurn {
                role: DialogueRole::User,
                content: entry.text.clone(),
            });
        } else {
            if !dialogue_history.is_empty() {
                dialogue_history.push(DialogueTurn {
                    role: DialogueRole::Other,
                    content: PLACEHOLDER_OTHER_RESPONSE.to_string(),
                });
            }

            let previous_text = side_channel
                .get(index - 1)
                .map(|prev| prev.text.clone())
                .unwrap_or_default();
            coaching_history.push(CoachingTurn {
                role: CoachingRole::User,
                content: previous_text,
            });

            if entry.sender == AiSender::Ai && entry.text != THINKING_PLACEHOLDER {
                coaching_history.push(CoachingTurn {
                    role: CoachingRole::Ai,
                    content: entry.text.clone(),
                });
            }
        }
    }

    coaching_history.push(CoachingTurn {
        role: CoachingRole::User,
        content: user_input.to_string(),
    });

    ConverseRequest {
        user_input: user_input.to_string(),
        dialogue_history,
        coaching_history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Message;
    use chrono::{Duration, Utc};

    fn chat_message(sender: &str, text: &str, offset_secs: i64) -> Message {
        Message {
            message_id: format!("m-{}-{}", sender, offset_secs),
            sender: Sender::from_id(sender),
            text: text.to_string(),
            timestamp: Utc::now() + Duration::seconds(offset_secs),
            ai_insight_request: false,
            ai_insight_response: String::new(),
        }
    }

    fn side_entry(id: &str, sender: AiSender, text: &str) -> AiConversationMessage {
        AiConversationMessage {
            id: id.to_string(),
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_dual_stream_dialogue_roles() {
        let messages = vec![chat_message("a", "hi", 0), chat_message("b", "yo", 1)];
        let request = build_history(HistoryPolicy::DualStream, "a", "what next?", &messages, &[], "");

        assert_eq!(
            request.dialogue_history,
            vec![
                DialogueTurn {
                    role: DialogueRole::User,
                    content: "hi".to_string()
                },
                DialogueTurn {
                    role: DialogueRole::Other,
                    content: "yo".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_dual_stream_skips_assistant_messages_in_dialogue() {
        let messages = vec![
            chat_message("a", "hi", 0),
            chat_message("AI", "an insight", 1),
            chat_message("b", "yo", 2),
        ];
        let request = build_history(HistoryPolicy::DualStream, "a", "x", &messages, &[], "");
        assert_eq!(request.dialogue_history.len(), 2);
    }

    #[test]
    fn test_dual_stream_excludes_thinking_from_coaching() {
        let side = vec![
            side_entry("1", AiSender::User, "help me"),
            side_entry("2", AiSender::Ai, THINKING_PLACEHOLDER),
            side_entry("3", AiSender::Ai, "try listening more"),
        ];
        let request = build_history(HistoryPolicy::DualStream, "a", "ok", &[], &side, "");

        assert!(request
            .coaching_history
            .iter()
            .all(|t| t.content != THINKING_PLACEHOLDER));
        assert_eq!(request.coaching_history.len(), 3); // user, ai, current
    }

    #[test]
    fn test_dual_stream_excludes_placeholder_by_doc_id() {
        let side = vec![
            side_entry("1", AiSender::User, "help me"),
            side_entry("pending", AiSender::Ai, "anything"),
        ];
        let request = build_history(HistoryPolicy::DualStream, "a", "ok", &[], &side, "pending");
        assert_eq!(request.coaching_history.len(), 2); // "help me" + current
    }

    #[test]
    fn test_dual_stream_dedups_outgoing_message() {
        // Write was already read back from the snapshot.
        let side = vec![
            side_entry("1", AiSender::Ai, "earlier advice"),
            side_entry("2", AiSender::User, "what now?"),
        ];
        let request = build_history(HistoryPolicy::DualStream, "a", "what now?", &[], &side, "");

        let user_turns: Vec<_> = request
            .coaching_history
            .iter()
            .filter(|t| t.role == CoachingRole::User && t.content == "what now?")
            .collect();
        assert_eq!(user_turns.len(), 1);
    }

    #[test]
    fn test_dual_stream_appends_outgoing_when_not_in_snapshot() {
        let side = vec![side_entry("1", AiSender::Ai, "earlier advice")];
        let request = build_history(HistoryPolicy::DualStream, "a", "fresh input", &[], &side, "");

        assert_eq!(
            request.coaching_history.last(),
            Some(&CoachingTurn {
                role: CoachingRole::User,
                content: "fresh input".to_string()
            })
        );
    }

    #[test]
    fn test_single_stream_index_parity() {
        let side = vec![
            side_entry("1", AiSender::User, "first question"),
            side_entry("2", AiSender::Ai, "first answer"),
            side_entry("3", AiSender::User, "second question"),
            side_entry("4", AiSender::Ai, "second answer"),
        ];
        let request = build_history(HistoryPolicy::SingleStream, "a", "third", &[], &side, "");

        // Even indexes become dialogue user turns, each odd index inserts a
        // synthesized other turn.
        assert_eq!(
            request.dialogue_history,
            vec![
                DialogueTurn {
                    role: DialogueRole::User,
                    content: "first question".to_string()
                },
                DialogueTurn {
                    role: DialogueRole::Other,
                    content: PLACEHOLDER_OTHER_RESPONSE.to_string()
                },
                DialogueTurn {
                    role: DialogueRole::User,
                    content: "second question".to_string()
                },
                DialogueTurn {
                    role: DialogueRole::Other,
                    content: PLACEHOLDER_OTHER_RESPONSE.to_string()
                },
            ]
        );

        // Odd indexes pair the previous text with the AI answer.
        assert_eq!(
            request.coaching_history,
            vec![
                CoachingTurn {
                    role: CoachingRole::User,
                    content: "first question".to_string()
                },
                CoachingTurn {
                    role: CoachingRole::Ai,
                    content: "first answer".to_string()
                },
                CoachingTurn {
                    role: CoachingRole::User,
                    content: "second question".to_string()
                },
                CoachingTurn {
                    role: CoachingRole::Ai,
                    content: "second answer".to_string()
                },
                CoachingTurn {
                    role: CoachingRole::User,
                    content: "third".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_single_stream_skips_placeholder_but_keeps_parity() {
        let side = vec![
            side_entry("1", AiSender::User, "question"),
            side_entry("pending", AiSender::Ai, THINKING_PLACEHOLDER),
        ];
        let request = build_history(HistoryPolicy::SingleStream, "a", "question", &[], &side, "pending");

        assert_eq!(request.dialogue_history.len(), 1);
        // No dedup in this policy: the current input is always appended.
        assert_eq!(
            request.coaching_history,
            vec![CoachingTurn {
                role: CoachingRole::User,
                content: "question".to_string()
            }]
        );
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "dual_stream".parse::<HistoryPolicy>().unwrap(),
            HistoryPolicy::DualStream
        );
        assert_eq!(
            "single_stream".parse::<HistoryPolicy>().unwrap(),
            HistoryPolicy::SingleStream
        );
        assert!("parallel".parse::<HistoryPolicy>().is_err());
    }

    #[test]
    fn test_roles_serialize_lowercase() {
        let request = build_history(
            HistoryPolicy::DualStream,
            "a",
            "hi",
            &[chat_message("b", "yo", 0)],
            &[],
            "",
        );
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["dialogue_history"][0]["role"], "other");
        assert_eq!(json["coaching_history"][0]["role"], "user");
    }
}
