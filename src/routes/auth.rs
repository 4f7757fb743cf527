// Auth routes - email/password sign-in and sign-up
// Proxies the Firebase Identity Toolkit REST API. Failures surface as a
// literal message string, never retried. Popup OAuth happens entirely on
// the client; the backend only ever sees the resulting ID tokens.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::profile_from_claims;
use crate::auth::IdTokenClaims;
use crate::AppState;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/sign-in", post(sign_in))
        .route("/v1/auth/sign-up", post(sign_up))
}

#[derive(Debug, Deserialize)]
pub struct EmailPasswordRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub uid: String,
    pub id_token: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// POST /v1/auth/sign-in - Email/password sign-in
async fn sign_in(
    State(state): State<AppState>,
    Json(request): Json<EmailPasswordRequest>,
) -> Result<Json<SignInResponse>, (StatusCode, String)> {
    tracing::info!("Email sign-in attempt for {}", request.email);
    identity_toolkit_call(&state, "accounts:signInWithPassword", &request).await
}

/// POST /v1/auth/sign-up - Email/password account creation
async fn sign_up(
    State(state): State<AppState>,
    Json(request): Json<EmailPasswordRequest>,
) -> Result<Json<SignInResponse>, (StatusCode, String)> {
    if !state.config.features.require_email_auth {
        return Err((
            StatusCode::FORBIDDEN,
            "Email sign-up is disabled".to_string(),
        ));
    }

    tracing::info!("Email sign-up attempt for {}", request.email);
    identity_toolkit_call(&state, "accounts:signUp", &request).await
}

async fn identity_toolkit_call(
    state: &AppState,
    action: &str,
    request: &EmailPasswordRequest,
) -> Result<Json<SignInResponse>, (StatusCode, String)> {
    let api_key = state.config.firebase_api_key.clone().ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "FIREBASE_API_KEY not configured".to_string(),
    ))?;

    let url = format!("{}/{}?key={}", IDENTITY_TOOLKIT_URL, action, api_key);
    let body = serde_json::json!({
        "email": request.email,
        "password": request.password,
        "returnSecureToken": true,
    });

    let response = reqwest::Client::new()
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            tracing::error!("Identity toolkit request failed: {}", e);
            (StatusCode::BAD_GATEWAY, "Sign-in service unavailable".to_string())
        })?;

    let status = response.status();
    let payload: Value = response.json().await.map_err(|e| {
        tracing::error!("Identity toolkit response unreadable: {}", e);
        (StatusCode::BAD_GATEWAY, "Sign-in service unavailable".to_string())
    })?;

    if !status.is_success() {
        let message = auth_error_message(&payload);
        tracing::warn!("Identity toolkit rejected {}: {}", request.email, message);
        return Err((StatusCode::UNAUTHORIZED, message));
    }

    let uid = payload
        .get("localId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let display_name = payload
        .get("displayName")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .or_else(|| request.display_name.clone());

    // Same merge-write the OAuth path performs on sign-in; best effort.
    let claims = IdTokenClaims {
        sub: uid.clone(),
        name: display_name.clone(),
        email: Some(request.email.clone()),
        picture: None,
    };
    if let Err(e) = state
        .firestore
        .upsert_user_profile(&profile_from_claims(&claims))
        .await
    {
        tracing::warn!("Profile upsert failed for {}: {}", uid, e);
    }

    Ok(Json(SignInResponse {
        uid,
        id_token: payload
            .get("idToken")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        email: Some(request.email.clone()),
        display_name,
    }))
}

/// Human-readable message from an identity toolkit error body.
fn auth_error_message(payload: &Value) -> String {
    payload
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("Sign-in failed. Please try again.")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_error_message_extracts_code() {
        let payload = json!({"error": {"message": "INVALID_PASSWORD", "code": 400}});
        assert_eq!(auth_error_message(&payload), "INVALID_PASSWORD");
    }

    #[test]
    fn test_auth_error_message_fallback() {
        assert_eq!(
            auth_error_message(&json!({})),
            "Sign-in failed. Please try again."
        );
    }
}
