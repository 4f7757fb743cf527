// Configuration - Environment variables

use std::env;

use crate::llm::HistoryPolicy;

/// Default hosted coaching endpoint.
const DEFAULT_AI_GATEWAY_URL: &str = "https://converse-backend-ai.onrender.com/coach";

/// Application configuration loaded from environment
#[derive(Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Firebase project ID (store + token verification)
    pub firebase_project_id: Option<String>,
    /// Firebase Web API key (identity toolkit sign-in/sign-up)
    pub firebase_api_key: Option<String>,
    /// Google Application Credentials path for Firestore
    pub google_application_credentials: Option<String>,
    /// Coaching endpoint URL
    pub ai_gateway_url: String,
    /// Feature knobs that used to drift across page variants
    pub features: FeatureConfig,
}

/// The recognized feature options, consolidated into one struct instead of
/// five near-identical page implementations.
#[derive(Debug, Clone, Copy)]
pub struct FeatureConfig {
    /// Expose the global AI-requests listing
    pub show_ai_tab: bool,
    /// Allow email/password sign-up in addition to token auth
    pub require_email_auth: bool,
    /// Which history reconstruction policy to apply
    pub history_policy: HistoryPolicy,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            show_ai_tab: true,
            require_email_auth: false,
            history_policy: HistoryPolicy::DualStream,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = FeatureConfig::default();
        let features = FeatureConfig {
            show_ai_tab: env_bool("SHOW_AI_TAB", defaults.show_ai_tab),
            require_email_auth: env_bool("REQUIRE_EMAIL_AUTH", defaults.require_email_auth),
            history_policy: env::var("HISTORY_POLICY")
                .ok()
                .and_then(|v| match v.parse() {
                    Ok(policy) => Some(policy),
                    Err(e) => {
                        tracing::warn!("{} - using default policy", e);
                        None
                    }
                })
                .unwrap_or(defaults.history_policy),
        };

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .ok()
                .or_else(|| env::var("GCP_PROJECT_ID").ok()),
            firebase_api_key: env::var("FIREBASE_API_KEY").ok(),
            google_application_credentials: env::var("GOOGLE_APPLICATION_CREDENTIALS").ok(),
            ai_gateway_url: env::var("AI_GATEWAY_URL")
                .unwrap_or_else(|_| DEFAULT_AI_GATEWAY_URL.to_string()),
            features,
        }
    }

    /// Validate that required configuration is present
    pub fn validate(&self) -> Result<(), String> {
        if self.google_application_credentials.is_none() {
            tracing::warn!(
                "GOOGLE_APPLICATION_CREDENTIALS not set - Firestore will use default credentials"
            );
        }
        if self.firebase_project_id.is_none() {
            tracing::warn!("FIREBASE_PROJECT_ID not set - token verification will fail");
        }
        if self.firebase_api_key.is_none() {
            tracing::warn!("FIREBASE_API_KEY not set - email sign-in will fail");
        }
        Ok(())
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_defaults() {
        let features = FeatureConfig::default();
        assert!(features.show_ai_tab);
        assert!(!features.require_email_auth);
        assert_eq!(features.history_policy, HistoryPolicy::DualStream);
    }
}
