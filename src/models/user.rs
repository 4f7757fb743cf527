// User profile model
// Documents live in the top-level `users` collection, keyed by uid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public profile for a signed-in user.
///
/// Merge-written on every sign-in; never deleted. Field names follow the
/// store's camelCase convention so documents written by older clients parse
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Minimal profile carrying only an id, used when the full document is
    /// missing. Display falls back to defaults downstream.
    pub fn bare(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            email: None,
            photo_url: None,
            profile_picture_url: None,
            online: false,
            created_at: None,
            last_active: None,
        }
    }

    /// Case-insensitive substring match on display name or email.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let query = query.to_lowercase();
        self.display_name
            .as_deref()
            .map(|n| n.to_lowercase().contains(&query))
            .unwrap_or(false)
            || self
                .email
                .as_deref()
                .map(|e| e.to_lowercase().contains(&query))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, email: &str) -> UserProfile {
        UserProfile {
            display_name: Some(name.to_string()),
            email: Some(email.to_string()),
            ..UserProfile::bare("u1")
        }
    }

    #[test]
    fn test_matches_query_case_insensitive() {
        let p = profile("Alice Johnson", "alice@example.com");
        assert!(p.matches_query("alice"));
        assert!(p.matches_query("JOHNSON"));
        assert!(p.matches_query("example.com"));
        assert!(!p.matches_query("bob"));
    }

    #[test]
    fn test_matches_query_empty_matches_all() {
        assert!(profile("Alice", "a@b.c").matches_query(""));
    }

    #[test]
    fn test_matches_query_missing_fields() {
        let p = UserProfile::bare("u2");
        assert!(!p.matches_query("anything"));
        assert!(p.matches_query(""));
    }
}
