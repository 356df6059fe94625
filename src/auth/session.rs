//! In-memory bearer sessions with an inactivity timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::AuthError;

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug)]
struct SessionEntry {
    user_id: i64,
    last_seen: Instant,
}

/// Active sessions keyed by token hash; the raw token is never stored.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<[u8; 32], SessionEntry>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout,
        }
    }

    pub fn with_timeout_minutes(minutes: i64) -> Self {
        Self::new(Duration::from_secs(minutes.max(0) as u64 * 60))
    }

    /// Open a session for `user_id` and return its bearer token.
    pub fn issue(&mut self, user_id: i64) -> String {
        self.purge_expired();
        let token = generate_token();
        self.sessions.insert(
            hash_token(&token),
            SessionEntry {
                user_id,
                last_seen: Instant::now(),
            },
        );
        token
    }

    /// Resolve a token to its user and refresh its activity stamp.
    pub fn validate(&mut self, token: &str) -> Result<i64, AuthError> {
        let key = hash_token(token);
        let entry = self
            .sessions
            .get_mut(&key)
            .ok_or(AuthError::Unauthenticated)?;
        if entry.last_seen.elapsed() >= self.timeout {
            self.sessions.remove(&key);
            return Err(AuthError::SessionExpired);
        }
        entry.last_seen = Instant::now();
        Ok(entry.user_id)
    }

    pub fn revoke(&mut self, token: &str) -> bool {
        self.sessions.remove(&hash_token(token)).is_some()
    }

    /// Drop every session of a user (deactivation, deletion).
    pub fn revoke_user(&mut self, user_id: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.user_id != user_id);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge_expired(&mut self) {
        let timeout = self.timeout;
        self.sessions.retain(|_, s| s.last_seen.elapsed() < timeout);
    }
}
