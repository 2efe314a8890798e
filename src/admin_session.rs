//! In-memory admin session table.
//!
//! Admin cookie-session auth is explicitly called out as an external
//! collaborator, not part of the specified core (spec §1). The persisted
//! state layout (§6.2) names exactly five sqlite tables and none of them is
//! a session table, so sessions are kept here as process memory instead of
//! a sixth table — the teacher's own scheme (random session id, looked up by
//! its sha256 digest) generalizes directly to an in-memory map since nothing
//! requires sessions to survive a restart.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

pub struct AdminSessionStore {
    sessions: RwLock<HashMap<Vec<u8>, DateTime<Utc>>>,
    max_age: ChronoDuration,
}

impl AdminSessionStore {
    pub fn new(max_age_secs: i64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_age: ChronoDuration::seconds(max_age_secs),
        }
    }

    /// Mint a new opaque session token, returning the raw value to hand to the
    /// client as a cookie. Only its digest is retained server-side.
    pub async fn issue(&self) -> String {
        let raw: [u8; 32] = OsRng.gen();
        let token = hex::encode(raw);
        let digest = Sha256::digest(token.as_bytes()).to_vec();

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, expires_at| *expires_at > Utc::now());
        sessions.insert(digest, Utc::now() + self.max_age);
        token
    }

    pub async fn validate(&self, token: &str) -> bool {
        let digest = Sha256::digest(token.as_bytes()).to_vec();
        let sessions = self.sessions.read().await;
        matches!(sessions.get(&digest), Some(expires_at) if *expires_at > Utc::now())
    }

    pub async fn revoke(&self, token: &str) {
        let digest = Sha256::digest(token.as_bytes()).to_vec();
        self.sessions.write().await.remove(&digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_token_validates_then_revokes() {
        let store = AdminSessionStore::new(3600);
        let token = store.issue().await;
        assert!(store.validate(&token).await);

        store.revoke(&token).await;
        assert!(!store.validate(&token).await);
    }

    #[tokio::test]
    async fn unknown_token_does_not_validate() {
        let store = AdminSessionStore::new(3600);
        assert!(!store.validate("not-a-real-token").await);
    }

    #[tokio::test]
    async fn expired_token_does_not_validate() {
        let store = AdminSessionStore::new(-1);
        let token = store.issue().await;
        assert!(!store.validate(&token).await);
    }
}
