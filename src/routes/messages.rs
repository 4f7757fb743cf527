// Message routes for the shared chat channel
// Endpoints: GET/POST /v1/chats/:chat_id/messages, plus an SSE stream that
// mirrors the store's live snapshots.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::auth::AuthUser;
use crate::models::{Message, RecentChatSummary, UserProfile};
use crate::services::{watch_messages, DEFAULT_POLL_INTERVAL};
use crate::AppState;

pub fn messages_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/chats/:chat_id/messages", get(get_messages))
        .route("/v1/chats/:chat_id/messages", post(send_message))
        .route("/v1/chats/:chat_id/messages/stream", get(stream_messages))
}

/// GET /v1/chats/:chat_id/messages - Messages, timestamp ascending
async fn get_messages(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<Message>>, (StatusCode, String)> {
    tracing::info!("Getting messages in chat {} for {}", chat_id, user.uid);

    let messages = state.firestore.list_messages(&chat_id).await.map_err(|e| {
        tracing::error!("Failed to get messages: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(messages))
}

/// GET /v1/chats/:chat_id/messages/stream - Live snapshots over SSE
///
/// Each event carries the full current message list, never a diff. The
/// watcher is owned by the stream and released when the client
/// disconnects.
async fn stream_messages(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Opening message stream on chat {} for {}", chat_id, user.uid);

    let subscription =
        watch_messages(state.firestore.clone(), chat_id, DEFAULT_POLL_INTERVAL).await;

    let stream = async_stream::stream! {
        let mut receiver = subscription.receiver();
        loop {
            let snapshot = receiver.borrow_and_update().clone();
            match Event::default().json_data(&snapshot) {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::warn!("Failed to encode snapshot: {}", e),
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
        drop(subscription);
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// POST /v1/chats/:chat_id/messages - Send a message
///
/// One logical action, two writes: the message append is surfaced to the
/// caller on failure; the recent-chat upsert is retried once independently
/// and only logged if it still fails.
async fn send_message(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), (StatusCode, String)> {
    let text = request.text.trim();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message text is empty".to_string()));
    }

    tracing::info!(
        "Sending message in chat {} from {}: {}",
        chat_id,
        user.uid,
        message_preview(text)
    );

    let message = Message::human(user.uid.clone(), text);

    state
        .firestore
        .add_message(&chat_id, &message)
        .await
        .map_err(|e| {
            tracing::error!("Failed to add message: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    // Inbox row carries the sender's profile: the row as the other
    // participant sees it.
    let sender_profile = match state.firestore.get_user(&user.uid).await {
        Ok(Some(profile)) => profile,
        _ => sender_fallback_profile(&user),
    };

    let summary = RecentChatSummary {
        chat_id: chat_id.clone(),
        user: sender_profile,
        last_message: text.to_string(),
        timestamp: Utc::now(),
    };

    let mut result = state.firestore.upsert_recent_chat(&summary).await;
    if result.is_err() {
        result = state.firestore.upsert_recent_chat(&summary).await;
    }
    if let Err(e) = result {
        tracing::warn!("Recent chat upsert failed for {}: {}", chat_id, e);
    }

    Ok((StatusCode::CREATED, Json(message)))
}

/// First 50 characters of a message for the log line. Counts chars, not
/// bytes, so multi-byte text never splits mid-character.
fn message_preview(text: &str) -> String {
    text.chars().take(50).collect()
}

fn sender_fallback_profile(user: &AuthUser) -> UserProfile {
    UserProfile {
        display_name: user.name.clone(),
        email: user.email.clone(),
        photo_url: user.picture.clone(),
        ..UserProfile::bare(user.uid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_preview_respects_char_boundaries() {
        // 49 ASCII bytes followed by a 4-byte emoji; a byte-offset slice at
        // 50 would land inside the emoji.
        let text = format!("{}🙂", "a".repeat(49));
        assert_eq!(message_preview(&text), text);

        let long = "é".repeat(80);
        let preview = message_preview(&long);
        assert_eq!(preview.chars().count(), 50);
        assert_eq!(preview, "é".repeat(50));
    }

    #[test]
    fn test_sender_fallback_profile() {
        let user = AuthUser {
            uid: "u1".to_string(),
            name: Some("Alice".to_string()),
            email: None,
            picture: None,
        };
        let profile = sender_fallback_profile(&user);
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert!(!profile.online);
    }
}
