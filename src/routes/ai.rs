// AI routes - shared-channel insights and the private coaching channel
// Endpoints: POST /v1/chats/:chat_id/ai, POST /v1/chats/:chat_id/coach,
// GET /v1/ai-requests
//
// Both flows write a "Thinking..." placeholder first, reconstruct the two
// histories from live snapshots, call the gateway, and persist its reply.
// Concurrent invocations are not queued or deduplicated; each produces its
// own placeholder/reply pair.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::llm::build_history;
use crate::models::{AiConversationMessage, AiGlobalRequest, Message};
use crate::AppState;

/// Query logged when an insight is requested without explicit text.
const DEFAULT_INSIGHT_QUERY: &str = "Analyze recent conversation";

pub fn ai_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/chats/:chat_id/ai", post(ask_ai))
        .route("/v1/chats/:chat_id/coach", post(coach))
        .route("/v1/ai-requests", get(get_ai_requests))
}

#[derive(Debug, Deserialize)]
pub struct AskAiRequest {
    /// What to ask; defaults to a conversation analysis prompt
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AiReplyResponse {
    pub response: String,
}

/// POST /v1/chats/:chat_id/ai - Request an AI insight in the shared channel
async fn ask_ai(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<AskAiRequest>,
) -> Result<Json<AiReplyResponse>, (StatusCode, String)> {
    let query = request
        .text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(DEFAULT_INSIGHT_QUERY)
        .to_string();

    tracing::info!("AI insight requested in chat {} by {}", chat_id, user.uid);

    // Placeholder goes into the shared channel so both participants see
    // the pending state.
    let placeholder = Message::thinking();
    state
        .firestore
        .add_message(&chat_id, &placeholder)
        .await
        .map_err(|e| {
            tracing::error!("Failed to add placeholder message: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let global_request = AiGlobalRequest::new(user.uid.clone(), query.clone(), &chat_id);
    if let Err(e) = state.firestore.add_global_request(&global_request).await {
        tracing::warn!("Failed to log AI request: {}", e);
    }

    // Snapshot both logs after the placeholder write so it can be excluded
    // by document id.
    let chat_messages = state
        .firestore
        .list_messages(&chat_id)
        .await
        .unwrap_or_default();
    let side_channel = state
        .firestore
        .list_ai_messages(&chat_id, &user.uid)
        .await
        .unwrap_or_default();

    let converse = build_history(
        state.config.features.history_policy,
        &user.uid,
        &query,
        &chat_messages,
        &side_channel,
        &placeholder.message_id,
    );

    let reply = state.gateway.coach(&converse).await;

    let reply_message = Message::assistant(reply.clone());
    state
        .firestore
        .add_message(&chat_id, &reply_message)
        .await
        .map_err(|e| {
            tracing::error!("Failed to add AI reply: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    if let Err(e) = state
        .firestore
        .set_global_request_response(&global_request.request_id, &reply)
        .await
    {
        tracing::warn!("Failed to record AI response: {}", e);
    }

    Ok(Json(AiReplyResponse { response: reply }))
}

#[derive(Debug, Deserialize)]
pub struct CoachRequest {
    pub text: String,
}

/// POST /v1/chats/:chat_id/coach - Private coaching turn
///
/// Writes into the caller's side-channel only; the shared message list is
/// read for dialogue context but never written. Gateway failures still
/// persist and return the apology string like any reply.
async fn coach(
    user: AuthUser,
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<CoachRequest>,
) -> Result<Json<AiReplyResponse>, (StatusCode, String)> {
    let text = request.text.trim().to_string();
    if text.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message text is empty".to_string()));
    }

    tracing::info!("Coaching turn in chat {} by {}", chat_id, user.uid);

    let user_turn = AiConversationMessage::user(text.clone());
    state
        .firestore
        .add_ai_message(&chat_id, &user.uid, &user_turn)
        .await
        .map_err(|e| {
            tracing::error!("Failed to add coaching message: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    let placeholder = AiConversationMessage::ai(crate::models::THINKING_PLACEHOLDER);
    if let Err(e) = state
        .firestore
        .add_ai_message(&chat_id, &user.uid, &placeholder)
        .await
    {
        tracing::warn!("Failed to add thinking placeholder: {}", e);
    }

    let chat_messages = state
        .firestore
        .list_messages(&chat_id)
        .await
        .unwrap_or_default();
    let side_channel = state
        .firestore
        .list_ai_messages(&chat_id, &user.uid)
        .await
        .unwrap_or_default();

    let converse = build_history(
        state.config.features.history_policy,
        &user.uid,
        &text,
        &chat_messages,
        &side_channel,
        &placeholder.id,
    );

    let reply = state.gateway.coach(&converse).await;

    let reply_turn = AiConversationMessage::ai(reply.clone());
    if let Err(e) = state
        .firestore
        .add_ai_message(&chat_id, &user.uid, &reply_turn)
        .await
    {
        tracing::error!("Failed to persist coaching reply: {}", e);
    }

    Ok(Json(AiReplyResponse { response: reply }))
}

#[derive(Debug, Deserialize)]
pub struct GetAiRequestsQuery {
    #[serde(default = "default_requests_limit")]
    pub limit: usize,
}

fn default_requests_limit() -> usize {
    50
}

/// GET /v1/ai-requests - The caller's AI invocation log
async fn get_ai_requests(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<GetAiRequestsQuery>,
) -> Result<Json<Vec<AiGlobalRequest>>, (StatusCode, String)> {
    if !state.config.features.show_ai_tab {
        return Err((StatusCode::NOT_FOUND, "Not found".to_string()));
    }

    tracing::info!("Listing AI requests for {}", user.uid);

    let requests = state
        .firestore
        .list_global_requests(&user.uid, query.limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list AI requests: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(requests))
}
