// Firebase authentication
// Verifies ID tokens issued by Firebase Auth (RS256 against Google's
// published JWKs) and exposes the identity to handlers through the
// AuthUser extractor. The external sign-in surfaces (OAuth popup,
// email/password) live on the client and in routes/auth.rs; this layer
// only checks the resulting tokens.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Extension,
};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::session::SessionTracker;

const JWK_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// RSA public key components from Google's JWK set
#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// Claims carried by a Firebase ID token that we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Firebase ID token verifier with a cached JWK set.
pub struct FirebaseAuth {
    project_id: String,
    client: reqwest::Client,
    keys: RwLock<HashMap<String, Jwk>>,
}

impl FirebaseAuth {
    pub fn new(project_id: String) -> Self {
        Self {
            project_id,
            client: reqwest::Client::new(),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the current JWK set. Keys rotate, so this is called at startup
    /// and again on an unknown kid.
    pub async fn refresh_keys(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let response = self.client.get(JWK_URL).send().await?;

        if !response.status().is_success() {
            return Err(format!("JWK fetch failed: {}", response.status()).into());
        }

        let set: JwkSet = response.json().await?;
        let mut keys = self.keys.write().await;
        keys.clear();
        for key in set.keys {
            keys.insert(key.kid.clone(), key);
        }

        tracing::info!("Loaded {} Firebase signing keys", keys.len());
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Option<Jwk> {
        self.keys.read().await.get(kid).cloned()
    }

    /// Verify an ID token and return its claims.
    pub async fn verify(
        &self,
        token: &str,
    ) -> Result<IdTokenClaims, Box<dyn std::error::Error + Send + Sync>> {
        let header = decode_header(token).map_err(|e| format!("Invalid token header: {}", e))?;
        let kid = header.kid.ok_or("Token has no key id")?;

        let jwk = match self.key_for(&kid).await {
            Some(jwk) => jwk,
            None => {
                // Possibly a rotated key
                self.refresh_keys().await?;
                self.key_for(&kid)
                    .await
                    .ok_or_else(|| format!("Unknown signing key: {}", kid))?
            }
        };

        let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
            .map_err(|e| format!("Invalid signing key: {}", e))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            self.project_id
        )]);

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| format!("Token verification failed: {}", e))?;

        Ok(data.claims)
    }
}

/// Layer the verifier into the router.
pub fn firebase_auth_extension(auth: Arc<FirebaseAuth>) -> Extension<Arc<FirebaseAuth>> {
    Extension(auth)
}

/// Extract the bearer token from an Authorization header value.
fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ").map(str::trim)
}

/// Authenticated user identity, extracted from the Authorization header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<Arc<FirebaseAuth>>()
            .cloned()
            .ok_or((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Auth verifier not configured".to_string(),
            ))?;

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = bearer_token(header).ok_or((
            StatusCode::UNAUTHORIZED,
            "Missing bearer token".to_string(),
        ))?;

        let claims = auth
            .verify(token)
            .await
            .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

        // Notify the session layer so the profile upsert happens once per
        // sign-in, not per request.
        if let Some(sessions) = parts.extensions.get::<Arc<SessionTracker>>() {
            sessions.observe(&claims);
        }

        Ok(AuthUser {
            uid: claims.sub,
            name: claims.name,
            email: claims.email,
            picture: claims.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(Some("Bearer abc.def.ghi")), Some("abc.def.ghi"));
        assert_eq!(bearer_token(Some("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage_token() {
        let auth = FirebaseAuth::new("test-project".to_string());
        assert!(auth.verify("not-a-jwt").await.is_err());
    }
}
