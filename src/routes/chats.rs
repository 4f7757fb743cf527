// Chat routes - creation and room resolution
// Endpoints: POST /v1/chats, GET /v1/chats/:chat_id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::models::{Chat, UserProfile};
use crate::services::direct_chat_id;
use crate::AppState;

/// Label shown when no participant or chat name can be resolved.
pub const DEFAULT_ROOM_NAME: &str = "Chat Room";

pub fn chats_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/chats", post(create_chat))
        .route("/v1/chats/:chat_id", get(get_chat))
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    /// The other participant; absent for a self/AI-only chat
    #[serde(default)]
    pub participant: Option<String>,
    #[serde(default)]
    pub chat_name: Option<String>,
}

/// POST /v1/chats - Start a chat
///
/// Two-party chats get a deterministic id from the participant pair, so
/// starting a chat with the same person again returns the existing one.
async fn create_chat(
    user: AuthUser,
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), (StatusCode, String)> {
    let mut participants = vec![user.uid.clone()];
    if let Some(other) = &request.participant {
        participants.push(other.clone());
    }

    let chat_id = match &request.participant {
        Some(other) => direct_chat_id(&user.uid, other),
        None => uuid::Uuid::new_v4().to_string(),
    };

    tracing::info!(
        "Starting chat {} for {} (participants: {:?})",
        chat_id,
        user.uid,
        participants
    );

    if let Ok(Some(existing)) = state.firestore.get_chat(&chat_id).await {
        return Ok((StatusCode::OK, Json(existing)));
    }

    let chat = Chat {
        chat_id,
        participants,
        created_at: Utc::now(),
        updated_at: None,
        chat_name: request
            .chat_name
            .clone()
            .or_else(|| Some(format!("Chat {}", Utc::now().timestamp_millis()))),
    };

    state.firestore.create_chat(&chat).await.map_err(|e| {
        tracing::error!("Failed to create chat: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(chat)))
}

#[derive(Debug, Serialize)]
pub struct ChatDetails {
    #[serde(flatten)]
    pub chat: Chat,
    /// Resolved display name for the room header
    pub room_name: String,
}

/// GET /v1/chats/:chat_id - Chat with its resolved room name
///
/// Name resolution: the other participant's display name, else the chat's
/// own name, else a generic label. A failed or missing participant read
/// degrades to the label, never an error.
async fn get_chat(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<ChatDetails>, (StatusCode, String)> {
    let chat = state
        .firestore
        .get_chat(&chat_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get chat {}: {}", chat_id, e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .ok_or((StatusCode::NOT_FOUND, "Chat not found".to_string()))?;

    let other_profile = match chat.other_participant(&user.uid) {
        Some(other_uid) => match state.firestore.get_user(other_uid).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!("Failed to read participant {}: {}", other_uid, e);
                None
            }
        },
        None => None,
    };

    let room_name = resolve_room_name(&chat, &user.uid, other_profile.as_ref());
    Ok(Json(ChatDetails { chat, room_name }))
}

fn resolve_room_name(chat: &Chat, viewer_uid: &str, other: Option<&UserProfile>) -> String {
    match chat.other_participant(viewer_uid) {
        Some(_) => other
            .and_then(|p| p.display_name.clone())
            .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string()),
        None => chat
            .chat_name
            .clone()
            .unwrap_or_else(|| DEFAULT_ROOM_NAME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(participants: &[&str], name: Option<&str>) -> Chat {
        Chat {
            chat_id: "c1".to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            created_at: Utc::now(),
            updated_at: None,
            chat_name: name.map(|n| n.to_string()),
        }
    }

    #[test]
    fn test_room_name_uses_other_participant() {
        let other = UserProfile {
            display_name: Some("Bob".to_string()),
            ..UserProfile::bare("b")
        };
        let name = resolve_room_name(&chat(&["a", "b"], None), "a", Some(&other));
        assert_eq!(name, "Bob");
    }

    #[test]
    fn test_room_name_falls_back_when_participant_missing() {
        let name = resolve_room_name(&chat(&["a", "b"], Some("Weekend plans")), "a", None);
        assert_eq!(name, DEFAULT_ROOM_NAME);
    }

    #[test]
    fn test_room_name_uses_chat_name_for_solo_chat() {
        let name = resolve_room_name(&chat(&["a"], Some("Notes")), "a", None);
        assert_eq!(name, "Notes");

        let name = resolve_room_name(&chat(&["a"], None), "a", None);
        assert_eq!(name, DEFAULT_ROOM_NAME);
    }
}
