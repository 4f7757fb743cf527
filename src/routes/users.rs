// User directory routes
// Endpoints: /v1/users, /v1/recent-chats

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::auth::AuthUser;
use crate::models::{RecentChatSummary, UserProfile};
use crate::services::{watch_recent_chats, DEFAULT_POLL_INTERVAL};
use crate::AppState;

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(get_users))
        .route("/v1/recent-chats", get(get_recent_chats))
        .route("/v1/recent-chats/stream", get(stream_recent_chats))
}

#[derive(Debug, Deserialize)]
pub struct GetUsersQuery {
    /// Case-insensitive substring filter on display name or email
    #[serde(default)]
    pub q: String,
}

/// GET /v1/users - List the user directory, excluding the caller
async fn get_users(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<GetUsersQuery>,
) -> Result<Json<Vec<UserProfile>>, (StatusCode, String)> {
    tracing::info!("Listing users for {} (q: {:?})", user.uid, query.q);

    let users = state.firestore.list_users().await.map_err(|e| {
        tracing::error!("Failed to list users: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;

    Ok(Json(filter_directory(users, &user.uid, &query.q)))
}

/// The directory never shows the caller, and matches the search query
/// against display name or email.
fn filter_directory(users: Vec<UserProfile>, self_uid: &str, query: &str) -> Vec<UserProfile> {
    users
        .into_iter()
        .filter(|u| u.uid != self_uid && u.matches_query(query))
        .collect()
}

#[derive(Debug, Deserialize)]
pub struct GetRecentChatsQuery {
    #[serde(default = "default_recent_limit")]
    pub limit: usize,
}

fn default_recent_limit() -> usize {
    7
}

/// GET /v1/recent-chats - Latest chat summaries, newest first
async fn get_recent_chats(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<GetRecentChatsQuery>,
) -> Result<Json<Vec<RecentChatSummary>>, (StatusCode, String)> {
    tracing::info!("Listing recent chats for {} (limit {})", user.uid, query.limit);

    let summaries = state
        .firestore
        .list_recent_chats(query.limit)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list recent chats: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    Ok(Json(summaries))
}

/// GET /v1/recent-chats/stream - Live inbox snapshots over SSE
///
/// Same shape as the non-streaming endpoint; each event carries the full
/// current list. The watcher is released when the client disconnects.
async fn stream_recent_chats(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<GetRecentChatsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!("Opening recent-chats stream for {}", user.uid);

    let subscription =
        watch_recent_chats(state.firestore.clone(), query.limit, DEFAULT_POLL_INTERVAL).await;

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

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(uid: &str, name: &str, email: &str) -> UserProfile {
        UserProfile {
            display_name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..UserProfile::bare(uid)
        }
    }

    #[test]
    fn test_filter_directory_excludes_self() {
        let users = vec![
            profile("me", "Me", "me@example.com"),
            profile("other", "Other", "other@example.com"),
        ];
        let filtered = filter_directory(users, "me", "");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].uid, "other");
    }

    #[test]
    fn test_filter_directory_matches_name_or_email() {
        let users = vec![
            profile("a", "Alice", "alice@example.com"),
            profile("b", "Bob", "bob@elsewhere.net"),
        ];
        assert_eq!(filter_directory(users.clone(), "me", "ALICE").len(), 1);
        assert_eq!(filter_directory(users.clone(), "me", "elsewhere").len(), 1);
        assert_eq!(filter_directory(users, "me", "carol").len(), 0);
    }
}
