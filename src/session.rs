// Session layer
// Process-wide holder for the current authentication state: one tracker is
// created at startup and torn down at shutdown, handed to the router by
// dependency injection (an Extension), never looked up ambiently. On each
// fresh sign-in it merge-writes the user's public profile (online: true)
// into the users collection and publishes the new state to subscribers.
// Profile write failures are logged, never surfaced; callers must not
// assume the write has landed before proceeding.

use axum::Extension;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::auth::IdTokenClaims;
use crate::models::UserProfile;
use crate::services::FirestoreService;

/// How long a verified uid stays "seen" before the next request triggers
/// another profile upsert.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::from_secs(300);

/// Published authentication state.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub loading: bool,
}

/// Tracks signed-in identities and keeps their store profiles fresh.
pub struct SessionTracker {
    firestore: Arc<FirestoreService>,
    seen: Mutex<HashMap<String, Instant>>,
    state: watch::Sender<SessionState>,
    refresh_window: Duration,
}

impl SessionTracker {
    pub fn new(firestore: Arc<FirestoreService>, refresh_window: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState {
            user: None,
            loading: true,
        });
        Arc::new(Self {
            firestore,
            seen: Mutex::new(HashMap::new()),
            state,
            refresh_window,
        })
    }

    /// Explicit subscription to authentication state; dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Record a verified identity. The first sighting within the refresh
    /// window publishes the state and upserts the profile in the
    /// background.
    pub fn observe(self: &Arc<Self>, claims: &IdTokenClaims) {
        let due = {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            mark_seen(&mut seen, &claims.sub, self.refresh_window, Instant::now())
        };
        if !due {
            return;
        }

        let profile = profile_from_claims(claims);

        // Publish before the write lands; the write is best-effort.
        self.state.send_replace(SessionState {
            user: Some(profile.clone()),
            loading: false,
        });

        let tracker = self.clone();
        tokio::spawn(async move {
            if let Err(e) = tracker.firestore.upsert_user_profile(&profile).await {
                tracing::warn!("Profile upsert failed for {}: {}", profile.uid, e);
            }
        });
    }
}

/// Returns true when `uid` is due for a profile refresh, marking it seen.
fn mark_seen(
    seen: &mut HashMap<String, Instant>,
    uid: &str,
    window: Duration,
    now: Instant,
) -> bool {
    match seen.get(uid) {
        Some(last) if now.duration_since(*last) < window => false,
        _ => {
            seen.insert(uid.to_string(), now);
            true
        }
    }
}

/// Build the public profile written on sign-in.
pub fn profile_from_claims(claims: &IdTokenClaims) -> UserProfile {
    UserProfile {
        uid: claims.sub.clone(),
        display_name: claims.name.clone(),
        email: claims.email.clone(),
        photo_url: claims.picture.clone(),
        profile_picture_url: claims.picture.clone(),
        online: true,
        created_at: None,
        last_active: Some(Utc::now()),
    }
}

/// Layer the tracker into the router.
pub fn session_extension(tracker: Arc<SessionTracker>) -> Extension<Arc<SessionTracker>> {
    Extension(tracker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(uid: &str) -> IdTokenClaims {
        IdTokenClaims {
            sub: uid.to_string(),
            name: Some("Alice".to_string()),
            email: Some("alice@example.com".to_string()),
            picture: Some("https://example.com/a.png".to_string()),
        }
    }

    #[test]
    fn test_profile_from_claims() {
        let profile = profile_from_claims(&claims("u1"));
        assert_eq!(profile.uid, "u1");
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert!(profile.online);
        assert!(profile.last_active.is_some());
        assert!(profile.created_at.is_none());
    }

    #[test]
    fn test_mark_seen_throttles_within_window() {
        let mut seen = HashMap::new();
        let window = Duration::from_secs(60);
        let start = Instant::now();

        assert!(mark_seen(&mut seen, "u1", window, start));
        assert!(!mark_seen(&mut seen, "u1", window, start + Duration::from_secs(30)));
        assert!(mark_seen(&mut seen, "u1", window, start + Duration::from_secs(61)));
        // A different uid is independent
        assert!(mark_seen(&mut seen, "u2", window, start + Duration::from_secs(30)));
    }
}
