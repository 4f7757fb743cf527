// Firestore service
// Uses the Firestore REST API: point reads, merge writes with an update
// mask, runQuery for ordered lists, and createDocument for appends. Auth
// via a service account JWT exchanged for a cached OAuth2 access token.

use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{
    AiConversationMessage, AiGlobalRequest, AiSender, Chat, Message, RecentChatSummary, Sender,
    UserProfile,
};

/// Service account credentials from JSON file
#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountCredentials {
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

/// JWT claims for Google OAuth2
#[derive(Debug, Serialize)]
struct GoogleJwtClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Cached access token with expiration
struct CachedToken {
    token: String,
    expires_at: i64,
}

/// Firestore collection paths
pub const USERS_COLLECTION: &str = "users";
pub const CHATS_COLLECTION: &str = "chats";
pub const RECENT_CHATS_COLLECTION: &str = "recentChats";
pub const AI_GLOBAL_REQUESTS_COLLECTION: &str = "aiGlobalRequests";
pub const MESSAGES_SUBCOLLECTION: &str = "messages";
pub const USER_AI_CHATS_SUBCOLLECTION: &str = "userAIChats";
pub const AI_MESSAGES_SUBCOLLECTION: &str = "aiMessages";

/// Generate a document ID from a seed string using SHA256 hash
pub fn document_id_from_seed(seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let result = hasher.finalize();
    hex::encode(&result[..10]) // First 20 hex chars (10 bytes)
}

/// Deterministic document id for a two-party chat: starting a chat with the
/// same person twice lands on the same document regardless of who starts.
pub fn direct_chat_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    document_id_from_seed(&format!("chat:{}:{}", first, second))
}

/// Firestore REST API client
pub struct FirestoreService {
    client: Client,
    project_id: String,
    credentials: Option<ServiceAccountCredentials>,
    cached_token: Arc<RwLock<Option<CachedToken>>>,
}

impl FirestoreService {
    /// Create a new Firestore service
    pub async fn new(project_id: String) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = Client::new();
        let credentials = Self::load_credentials()?;

        let service = Self {
            client,
            project_id,
            credentials,
            cached_token: Arc::new(RwLock::new(None)),
        };

        // Pre-fetch an access token
        if let Err(e) = service.get_access_token().await {
            tracing::warn!("Failed to get initial access token: {}", e);
        }

        Ok(service)
    }

    /// Load service account credentials from JSON file
    fn load_credentials(
    ) -> Result<Option<ServiceAccountCredentials>, Box<dyn std::error::Error + Send + Sync>> {
        let creds_path = match std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            Ok(path) => path,
            Err(_) => {
                if std::path::Path::new("google-credentials.json").exists() {
                    "google-credentials.json".to_string()
                } else {
                    tracing::warn!(
                        "No GOOGLE_APPLICATION_CREDENTIALS set and no google-credentials.json found"
                    );
                    return Ok(None);
                }
            }
        };

        tracing::info!("Loading service account credentials from: {}", creds_path);

        let creds_json = std::fs::read_to_string(&creds_path)
            .map_err(|e| format!("Failed to read credentials file {}: {}", creds_path, e))?;

        let credentials: ServiceAccountCredentials = serde_json::from_str(&creds_json)
            .map_err(|e| format!("Failed to parse credentials JSON: {}", e))?;

        tracing::info!(
            "Loaded credentials for service account: {}",
            credentials.client_email
        );

        Ok(Some(credentials))
    }

    /// Get access token, using cache if valid or refreshing if needed
    async fn get_access_token(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        {
            let cache = self.cached_token.read().await;
            if let Some(cached) = cache.as_ref() {
                let now = Utc::now().timestamp();
                // Use token if it has at least 60 seconds left
                if cached.expires_at > now + 60 {
                    return Ok(cached.token.clone());
                }
            }
        }

        let token = self.fetch_new_access_token().await?;

        // Tokens are valid for 1 hour, refresh after 55 minutes
        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: Utc::now().timestamp() + 3300,
            });
        }

        Ok(token)
    }

    /// Fetch a new access token from Google OAuth
    async fn fetch_new_access_token(
        &self,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(creds) = &self.credentials {
            let token = self.get_token_from_service_account(creds).await?;
            return Ok(token);
        }

        // Fall back to metadata server (for GKE/Cloud Run without credentials file)
        if let Ok(token) = self.try_metadata_server().await {
            tracing::info!("Got access token from GCP metadata server");
            return Ok(token);
        }

        Err("No valid authentication method available. Set GOOGLE_APPLICATION_CREDENTIALS or run on GCP.".into())
    }

    /// Try to get token from GCP metadata server
    async fn try_metadata_server(&self) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let metadata_url =
            "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

        let response = self
            .client
            .get(metadata_url)
            .header("Metadata-Flavor", "Google")
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await?;

        if response.status().is_success() {
            #[derive(Deserialize)]
            struct TokenResponse {
                access_token: String,
            }
            let token: TokenResponse = response.json().await?;
            return Ok(token.access_token);
        }

        Err("Metadata server not available".into())
    }

    /// Get access token using service account credentials (OAuth2 JWT flow)
    async fn get_token_from_service_account(
        &self,
        creds: &ServiceAccountCredentials,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let now = Utc::now().timestamp();
        let token_uri = creds
            .token_uri
            .as_deref()
            .unwrap_or("https://oauth2.googleapis.com/token");

        let claims = GoogleJwtClaims {
            iss: creds.client_email.clone(),
            scope: "https://www.googleapis.com/auth/datastore".to_string(),
            aud: token_uri.to_string(),
            iat: now,
            exp: now + 3600,
        };

        let key = EncodingKey::from_rsa_pem(creds.private_key.as_bytes())
            .map_err(|e| format!("Failed to parse private key: {}", e))?;

        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| format!("Failed to encode JWT: {}", e))?;

        let response = self
            .client
            .post(token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .map_err(|e| format!("Token request failed: {}", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(format!("Token exchange failed: {}", error_text).into());
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse token response: {}", e))?;

        Ok(token_response.access_token)
    }

    /// Build Firestore REST API base URL
    fn base_url(&self) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    /// Build request with auth header
    async fn build_request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> Result<reqwest::RequestBuilder, Box<dyn std::error::Error + Send + Sync>> {
        let mut req = self.client.request(method, url);
        let token = self.get_access_token().await?;
        req = req.bearer_auth(token);
        Ok(req)
    }

    /// Run a structured query under `parent` and return the raw documents.
    async fn run_query(
        &self,
        parent: &str,
        structured_query: Value,
    ) -> Result<Vec<Value>, Box<dyn std::error::Error + Send + Sync>> {
        let query = json!({ "structuredQuery": structured_query });

        let response = self
            .build_request(reqwest::Method::POST, &format!("{}:runQuery", parent))
            .await?
            .json(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            tracing::error!("Firestore query error: {}", error_text);
            return Err(format!("Firestore query failed: {}", error_text).into());
        }

        let results: Vec<Value> = response.json().await?;
        Ok(results
            .into_iter()
            .filter_map(|row| row.get("document").cloned())
            .collect())
    }

    /// Point-read one document, mapping 404 to None.
    async fn get_document(
        &self,
        path: &str,
    ) -> Result<Option<Value>, Box<dyn std::error::Error + Send + Sync>> {
        let url = format!("{}/{}", self.base_url(), path);

        let response = self
            .build_request(reqwest::Method::GET, &url)
            .await?
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Failed to get document {}: {}", path, error_text).into());
        }

        let doc: Value = response.json().await?;
        Ok(Some(doc))
    }

    /// Append a document with a known id (createDocument).
    async fn create_document(
        &self,
        parent_path: &str,
        collection_id: &str,
        document_id: &str,
        fields: Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let url = format!(
            "{}{}/{}?documentId={}",
            self.base_url(),
            parent_path,
            collection_id,
            document_id
        );

        let response = self
            .build_request(reqwest::Method::POST, &url)
            .await?
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!(
                "Failed to create document in {}{}: {}",
                parent_path, collection_id, error_text
            )
            .into());
        }

        Ok(())
    }

    /// Merge-write fields into a document. With an update mask unspecified
    /// fields are never removed; without one the document is replaced.
    async fn patch_document(
        &self,
        path: &str,
        fields: Value,
        update_mask: Option<&[&str]>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let url = match update_mask {
            Some(mask) => {
                let mask_params = mask
                    .iter()
                    .map(|f| format!("updateMask.fieldPaths={}", f))
                    .collect::<Vec<_>>()
                    .join("&");
                format!("{}/{}?{}", self.base_url(), path, mask_params)
            }
            None => format!("{}/{}", self.base_url(), path),
        };

        let response = self
            .build_request(reqwest::Method::PATCH, &url)
            .await?
            .json(&json!({ "fields": fields }))
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(format!("Failed to patch document {}: {}", path, error_text).into());
        }

        Ok(())
    }

    // =========================================================================
    // USERS
    // =========================================================================

    /// Merge-write a user's public profile fields.
    /// Path: users/{uid}
    pub async fn upsert_user_profile(
        &self,
        profile: &UserProfile,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (fields, mask) = profile_fields(profile);
        let mask_refs: Vec<&str> = mask.iter().map(String::as_str).collect();

        self.patch_document(
            &format!("{}/{}", USERS_COLLECTION, profile.uid),
            fields,
            Some(&mask_refs),
        )
        .await
    }

    /// Get a user's profile, None if the document is missing.
    pub async fn get_user(
        &self,
        uid: &str,
    ) -> Result<Option<UserProfile>, Box<dyn std::error::Error + Send + Sync>> {
        let doc = self
            .get_document(&format!("{}/{}", USERS_COLLECTION, uid))
            .await?;
        Ok(doc.map(|d| parse_user_profile(&d)))
    }

    /// List all known user profiles.
    pub async fn list_users(
        &self,
    ) -> Result<Vec<UserProfile>, Box<dyn std::error::Error + Send + Sync>> {
        let docs = self
            .run_query(
                &self.base_url(),
                json!({ "from": [{"collectionId": USERS_COLLECTION}] }),
            )
            .await?;

        Ok(docs.iter().map(parse_user_profile).collect())
    }

    // =========================================================================
    // CHATS
    // =========================================================================

    /// Get a chat, None if missing.
    pub async fn get_chat(
        &self,
        chat_id: &str,
    ) -> Result<Option<Chat>, Box<dyn std::error::Error + Send + Sync>> {
        let doc = self
            .get_document(&format!("{}/{}", CHATS_COLLECTION, chat_id))
            .await?;
        doc.map(|d| parse_chat(&d)).transpose()
    }

    /// Create a chat document with a known id.
    pub async fn create_chat(
        &self,
        chat: &Chat,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut fields = json!({
            "participants": {
                "arrayValue": {
                    "values": chat.participants.iter()
                        .map(|p| json!({"stringValue": p}))
                        .collect::<Vec<_>>()
                }
            },
            "createdAt": timestamp_value(chat.created_at),
        });
        if let Some(name) = &chat.chat_name {
            fields["chatName"] = json!({"stringValue": name});
        }

        self.create_document("", CHATS_COLLECTION, &chat.chat_id, fields)
            .await
    }

    // =========================================================================
    // MESSAGES
    // =========================================================================

    /// Messages of a chat, ordered by timestamp ascending.
    /// Path: chats/{chatId}/messages
    pub async fn list_messages(
        &self,
        chat_id: &str,
    ) -> Result<Vec<Message>, Box<dyn std::error::Error + Send + Sync>> {
        let parent = format!("{}/{}/{}", self.base_url(), CHATS_COLLECTION, chat_id);
        let docs = self
            .run_query(
                &parent,
                json!({
                    "from": [{"collectionId": MESSAGES_SUBCOLLECTION}],
                    "orderBy": [{"field": {"fieldPath": "timestamp"}, "direction": "ASCENDING"}]
                }),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match parse_message(doc) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Failed to parse message: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Append a message to a chat.
    pub async fn add_message(
        &self,
        chat_id: &str,
        message: &Message,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let fields = json!({
            "senderId": {"stringValue": message.sender.as_id()},
            "text": {"stringValue": message.text},
            "timestamp": timestamp_value(message.timestamp),
            "aiInsightRequest": {"booleanValue": message.ai_insight_request},
            "aiInsightResponse": {"stringValue": message.ai_insight_response},
        });

        self.create_document(
            &format!("/{}/{}", CHATS_COLLECTION, chat_id),
            MESSAGES_SUBCOLLECTION,
            &message.message_id,
            fields,
        )
        .await
    }

    // =========================================================================
    // RECENT CHATS
    // =========================================================================

    /// Overwrite the inbox row for a chat. Keyed by chat id, so repeated
    /// sends leave exactly one summary holding the latest message.
    pub async fn upsert_recent_chat(
        &self,
        summary: &RecentChatSummary,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (path, fields) = recent_chat_document(summary);
        self.patch_document(&path, fields, None).await
    }

    /// Most recent chat summaries, newest first.
    pub async fn list_recent_chats(
        &self,
        limit: usize,
    ) -> Result<Vec<RecentChatSummary>, Box<dyn std::error::Error + Send + Sync>> {
        let docs = self
            .run_query(
                &self.base_url(),
                json!({
                    "from": [{"collectionId": RECENT_CHATS_COLLECTION}],
                    "orderBy": [{"field": {"fieldPath": "timestamp"}, "direction": "DESCENDING"}],
                    "limit": limit
                }),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match parse_recent_chat(doc) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::warn!("Failed to parse recent chat: {}", e);
                    None
                }
            })
            .collect())
    }

    // =========================================================================
    // AI SIDE-CHANNEL
    // =========================================================================

    /// Private coaching log for (chat, user), ordered by timestamp
    /// ascending.
    /// Path: chats/{chatId}/userAIChats/{userId}/aiMessages
    pub async fn list_ai_messages(
        &self,
        chat_id: &str,
        uid: &str,
    ) -> Result<Vec<AiConversationMessage>, Box<dyn std::error::Error + Send + Sync>> {
        let parent = format!(
            "{}/{}/{}/{}/{}",
            self.base_url(),
            CHATS_COLLECTION,
            chat_id,
            USER_AI_CHATS_SUBCOLLECTION,
            uid
        );
        let docs = self
            .run_query(
                &parent,
                json!({
                    "from": [{"collectionId": AI_MESSAGES_SUBCOLLECTION}],
                    "orderBy": [{"field": {"fieldPath": "timestamp"}, "direction": "ASCENDING"}]
                }),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match parse_ai_message(doc) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!("Failed to parse AI message: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Append an entry to a user's private coaching log.
    pub async fn add_ai_message(
        &self,
        chat_id: &str,
        uid: &str,
        message: &AiConversationMessage,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let sender = match message.sender {
            AiSender::User => "USER",
            AiSender::Ai => "AI",
        };
        let fields = json!({
            "sender": {"stringValue": sender},
            "text": {"stringValue": message.text},
            "timestamp": timestamp_value(message.timestamp),
        });

        self.create_document(
            &format!(
                "/{}/{}/{}/{}",
                CHATS_COLLECTION, chat_id, USER_AI_CHATS_SUBCOLLECTION, uid
            ),
            AI_MESSAGES_SUBCOLLECTION,
            &message.id,
            fields,
        )
        .await
    }

    // =========================================================================
    // AI GLOBAL REQUESTS
    // =========================================================================

    /// Log an AI invocation.
    pub async fn add_global_request(
        &self,
        request: &AiGlobalRequest,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let fields = json!({
            "userId": {"stringValue": request.user_id},
            "query": {"stringValue": request.query},
            "timestamp": timestamp_value(request.timestamp),
            "response": {"stringValue": request.response},
            "relatedChatIds": {
                "arrayValue": {
                    "values": request.related_chat_ids.iter()
                        .map(|id| json!({"stringValue": id}))
                        .collect::<Vec<_>>()
                }
            },
        });

        self.create_document(
            "",
            AI_GLOBAL_REQUESTS_COLLECTION,
            &request.request_id,
            fields,
        )
        .await
    }

    /// Fill in the response field of a logged request once the gateway has
    /// answered.
    pub async fn set_global_request_response(
        &self,
        request_id: &str,
        response: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.patch_document(
            &format!("{}/{}", AI_GLOBAL_REQUESTS_COLLECTION, request_id),
            json!({ "response": {"stringValue": response} }),
            Some(&["response"]),
        )
        .await
    }

    /// A user's AI invocation log, newest first.
    pub async fn list_global_requests(
        &self,
        uid: &str,
        limit: usize,
    ) -> Result<Vec<AiGlobalRequest>, Box<dyn std::error::Error + Send + Sync>> {
        let docs = self
            .run_query(
                &self.base_url(),
                json!({
                    "from": [{"collectionId": AI_GLOBAL_REQUESTS_COLLECTION}],
                    "where": {
                        "fieldFilter": {
                            "field": {"fieldPath": "userId"},
                            "op": "EQUAL",
                            "value": {"stringValue": uid}
                        }
                    },
                    "orderBy": [{"field": {"fieldPath": "timestamp"}, "direction": "DESCENDING"}],
                    "limit": limit
                }),
            )
            .await?;

        Ok(docs
            .iter()
            .filter_map(|doc| match parse_global_request(doc) {
                Ok(request) => Some(request),
                Err(e) => {
                    tracing::warn!("Failed to parse AI request: {}", e);
                    None
                }
            })
            .collect())
    }
}

// =============================================================================
// Field encoding
// =============================================================================

fn timestamp_value(ts: DateTime<Utc>) -> Value {
    json!({"timestampValue": ts.to_rfc3339()})
}

/// Encode a profile as Firestore fields plus the matching update mask.
/// Absent optional fields stay out of the mask so merge writes never erase
/// them.
fn profile_fields(profile: &UserProfile) -> (Value, Vec<String>) {
    let mut fields = json!({
        "uid": {"stringValue": profile.uid},
        "online": {"booleanValue": profile.online},
    });
    let mut mask = vec!["uid".to_string(), "online".to_string()];

    if let Some(name) = &profile.display_name {
        fields["displayName"] = json!({"stringValue": name});
        mask.push("displayName".to_string());
    }
    if let Some(email) = &profile.email {
        fields["email"] = json!({"stringValue": email});
        mask.push("email".to_string());
    }
    if let Some(url) = &profile.photo_url {
        fields["photoURL"] = json!({"stringValue": url});
        mask.push("photoURL".to_string());
    }
    if let Some(url) = &profile.profile_picture_url {
        fields["profilePictureUrl"] = json!({"stringValue": url});
        mask.push("profilePictureUrl".to_string());
    }
    if let Some(created) = profile.created_at {
        fields["createdAt"] = timestamp_value(created);
        mask.push("createdAt".to_string());
    }
    if let Some(active) = profile.last_active {
        fields["lastActive"] = timestamp_value(active);
        mask.push("lastActive".to_string());
    }

    (fields, mask)
}

/// Document path and fields for an inbox row. The path is keyed by chat id,
/// so every write for a chat lands on the same document and only the latest
/// summary survives.
fn recent_chat_document(summary: &RecentChatSummary) -> (String, Value) {
    let (user_fields, _) = profile_fields(&summary.user);
    let fields = json!({
        "user": {"mapValue": {"fields": user_fields}},
        "lastMessage": {"stringValue": summary.last_message},
        "timestamp": timestamp_value(summary.timestamp),
    });
    (
        format!("{}/{}", RECENT_CHATS_COLLECTION, summary.chat_id),
        fields,
    )
}

// =============================================================================
// Document parsing
// =============================================================================

/// Last path segment of a document's resource name.
fn doc_id(doc: &Value) -> String {
    doc.get("name")
        .and_then(|n| n.as_str())
        .and_then(|n| n.rsplit('/').next())
        .unwrap_or_default()
        .to_string()
}

fn parse_string(fields: &Value, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(|s| s.to_string())
}

fn parse_bool(fields: &Value, key: &str) -> Option<bool> {
    fields.get(key)?.get("booleanValue")?.as_bool()
}

fn parse_timestamp(
    fields: &Value,
    key: &str,
) -> Result<DateTime<Utc>, Box<dyn std::error::Error + Send + Sync>> {
    let ts = fields
        .get(key)
        .and_then(|v| v.get("timestampValue"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing timestamp field: {}", key))?;

    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp {}: {}", key, e).into())
}

fn parse_timestamp_optional(fields: &Value, key: &str) -> Option<DateTime<Utc>> {
    fields
        .get(key)
        .and_then(|v| v.get("timestampValue"))
        .and_then(|v| v.as_str())
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_string_array(fields: &Value, key: &str) -> Vec<String> {
    fields
        .get(key)
        .and_then(|v| v.get("arrayValue"))
        .and_then(|v| v.get("values"))
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.get("stringValue").and_then(|s| s.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse a profile from document fields; tolerant of partial documents.
fn parse_profile_fields(uid: String, fields: &Value) -> UserProfile {
    UserProfile {
        uid,
        display_name: parse_string(fields, "displayName"),
        email: parse_string(fields, "email"),
        photo_url: parse_string(fields, "photoURL"),
        profile_picture_url: parse_string(fields, "profilePictureUrl"),
        online: parse_bool(fields, "online").unwrap_or(false),
        created_at: parse_timestamp_optional(fields, "createdAt"),
        last_active: parse_timestamp_optional(fields, "lastActive"),
    }
}

fn parse_user_profile(doc: &Value) -> UserProfile {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);
    let uid = parse_string(fields, "uid").unwrap_or_else(|| doc_id(doc));
    parse_profile_fields(uid, fields)
}

fn parse_chat(doc: &Value) -> Result<Chat, Box<dyn std::error::Error + Send + Sync>> {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);

    Ok(Chat {
        chat_id: doc_id(doc),
        participants: parse_string_array(fields, "participants"),
        created_at: parse_timestamp(fields, "createdAt")?,
        updated_at: parse_timestamp_optional(fields, "updatedAt"),
        chat_name: parse_string(fields, "chatName"),
    })
}

fn parse_message(doc: &Value) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);

    let sender_id =
        parse_string(fields, "senderId").ok_or("Missing senderId field on message")?;

    Ok(Message {
        message_id: doc_id(doc),
        sender: Sender::from_id(&sender_id),
        text: parse_string(fields, "text").unwrap_or_default(),
        timestamp: parse_timestamp(fields, "timestamp")?,
        ai_insight_request: parse_bool(fields, "aiInsightRequest").unwrap_or(false),
        ai_insight_response: parse_string(fields, "aiInsightResponse").unwrap_or_default(),
    })
}

fn parse_ai_message(
    doc: &Value,
) -> Result<AiConversationMessage, Box<dyn std::error::Error + Send + Sync>> {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);

    let sender = match parse_string(fields, "sender").as_deref() {
        Some("AI") => AiSender::Ai,
        Some("USER") => AiSender::User,
        other => return Err(format!("Unknown AI message sender: {:?}", other).into()),
    };

    Ok(AiConversationMessage {
        id: doc_id(doc),
        sender,
        text: parse_string(fields, "text").unwrap_or_default(),
        timestamp: parse_timestamp(fields, "timestamp")?,
    })
}

fn parse_recent_chat(
    doc: &Value,
) -> Result<RecentChatSummary, Box<dyn std::error::Error + Send + Sync>> {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);

    let user_fields = fields
        .get("user")
        .and_then(|u| u.get("mapValue"))
        .and_then(|m| m.get("fields"))
        .ok_or("Missing user field on recent chat")?;
    let uid = parse_string(user_fields, "uid").unwrap_or_default();

    Ok(RecentChatSummary {
        chat_id: doc_id(doc),
        user: parse_profile_fields(uid, user_fields),
        last_message: parse_string(fields, "lastMessage").unwrap_or_default(),
        timestamp: parse_timestamp(fields, "timestamp")?,
    })
}

fn parse_global_request(
    doc: &Value,
) -> Result<AiGlobalRequest, Box<dyn std::error::Error + Send + Sync>> {
    let empty = json!({});
    let fields = doc.get("fields").unwrap_or(&empty);

    Ok(AiGlobalRequest {
        request_id: doc_id(doc),
        user_id: parse_string(fields, "userId").ok_or("Missing userId field on AI request")?,
        query: parse_string(fields, "query").unwrap_or_default(),
        timestamp: parse_timestamp(fields, "timestamp")?,
        response: parse_string(fields, "response").unwrap_or_default(),
        related_chat_ids: parse_string_array(fields, "relatedChatIds"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_seed() {
        let id = document_id_from_seed("test content");
        assert_eq!(id.len(), 20);
        assert_eq!(id, document_id_from_seed("test content"));
        assert_ne!(id, document_id_from_seed("different content"));
    }

    #[test]
    fn test_direct_chat_id_symmetric() {
        assert_eq!(direct_chat_id("alice", "bob"), direct_chat_id("bob", "alice"));
        assert_ne!(direct_chat_id("alice", "bob"), direct_chat_id("alice", "carol"));
    }

    #[test]
    fn test_parse_message() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/chats/c1/messages/m1",
            "fields": {
                "senderId": {"stringValue": "user-1"},
                "text": {"stringValue": "hello"},
                "timestamp": {"timestampValue": "2025-03-01T12:00:00Z"},
                "aiInsightRequest": {"booleanValue": false},
                "aiInsightResponse": {"stringValue": ""}
            }
        });

        let message = parse_message(&doc).unwrap();
        assert_eq!(message.message_id, "m1");
        assert_eq!(message.sender, Sender::Human("user-1".to_string()));
        assert_eq!(message.text, "hello");
        assert!(!message.ai_insight_request);
    }

    #[test]
    fn test_parse_message_ai_sender() {
        let doc = json!({
            "name": ".../messages/m2",
            "fields": {
                "senderId": {"stringValue": "AI"},
                "text": {"stringValue": "Thinking..."},
                "timestamp": {"timestampValue": "2025-03-01T12:00:01Z"},
                "aiInsightRequest": {"booleanValue": true}
            }
        });

        let message = parse_message(&doc).unwrap();
        assert_eq!(message.sender, Sender::Assistant);
        assert!(message.ai_insight_request);
    }

    #[test]
    fn test_profile_fields_round_trip() {
        let profile = UserProfile {
            uid: "u1".to_string(),
            display_name: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            photo_url: Some("https://example.com/a.png".to_string()),
            profile_picture_url: None,
            online: true,
            created_at: None,
            last_active: Some(Utc::now()),
        };

        let (fields, mask) = profile_fields(&profile);
        // Absent optionals stay out of the mask so merge never erases them
        assert!(mask.contains(&"displayName".to_string()));
        assert!(!mask.contains(&"profilePictureUrl".to_string()));
        assert!(!mask.contains(&"createdAt".to_string()));

        let parsed = parse_profile_fields("u1".to_string(), &fields);
        assert_eq!(parsed.display_name, profile.display_name);
        assert_eq!(parsed.email, profile.email);
        assert!(parsed.online);
        assert!(parsed.profile_picture_url.is_none());
    }

    #[test]
    fn test_recent_chat_writes_keyed_by_chat_id() {
        let first = RecentChatSummary {
            chat_id: "chat-1".to_string(),
            user: UserProfile::bare("u1"),
            last_message: "hello".to_string(),
            timestamp: Utc::now(),
        };
        let second = RecentChatSummary {
            last_message: "goodbye".to_string(),
            ..first.clone()
        };

        let (first_path, _) = recent_chat_document(&first);
        let (second_path, second_fields) = recent_chat_document(&second);

        // Same chat, same document; the later write overwrites the earlier
        assert_eq!(first_path, second_path);
        assert_eq!(first_path, "recentChats/chat-1");
        assert_eq!(second_fields["lastMessage"]["stringValue"], "goodbye");

        let other = RecentChatSummary {
            chat_id: "chat-2".to_string(),
            ..first
        };
        assert_ne!(recent_chat_document(&other).0, second_path);
    }

    #[test]
    fn test_parse_recent_chat() {
        let doc = json!({
            "name": ".../recentChats/chat-1",
            "fields": {
                "user": {"mapValue": {"fields": {
                    "uid": {"stringValue": "u1"},
                    "displayName": {"stringValue": "Alice"}
                }}},
                "lastMessage": {"stringValue": "hello"},
                "timestamp": {"timestampValue": "2025-03-01T12:00:00Z"}
            }
        });

        let summary = parse_recent_chat(&doc).unwrap();
        assert_eq!(summary.chat_id, "chat-1");
        assert_eq!(summary.user.uid, "u1");
        assert_eq!(summary.last_message, "hello");
    }

    #[test]
    fn test_parse_chat_missing_optionals() {
        let doc = json!({
            "name": ".../chats/c9",
            "fields": {
                "participants": {"arrayValue": {"values": [
                    {"stringValue": "a"}, {"stringValue": "b"}
                ]}},
                "createdAt": {"timestampValue": "2025-03-01T12:00:00Z"}
            }
        });

        let chat = parse_chat(&doc).unwrap();
        assert_eq!(chat.chat_id, "c9");
        assert_eq!(chat.participants, vec!["a", "b"]);
        assert!(chat.chat_name.is_none());
        assert!(chat.updated_at.is_none());
    }
}
