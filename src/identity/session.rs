use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{AppError, AppResult};
use crate::storage::SharedCache;

use super::principal::Identity;

/// Cached login state for one user. Its presence in the credential cache is
/// what makes that user's access tokens honorable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
    pub issued_at: DateTime<Utc>,
    pub refreshed_at: DateTime<Utc>,
}

pub fn session_key(user_id: &str) -> String { format!("session:{}", user_id) }

#[derive(Clone)]
pub struct SessionManager {
    cache: SharedCache,
    ttl_secs: u64,
    clock: SharedClock,
}

impl SessionManager {
    pub fn new(cache: SharedCache, ttl_secs: i64, clock: SharedClock) -> Self {
        Self { cache, ttl_secs: ttl_secs.max(1) as u64, clock }
    }

    /// Overwrite the session for `identity.id` (login, activation).
    pub async fn store(&self, identity: &Identity) -> AppResult<Session> {
        let now = self.clock.now();
        let sess = Session { identity: identity.clone(), issued_at: now, refreshed_at: now };
        self.write(&sess).await?;
        tracing::debug!(target: "auth", "session stored for {} (ttl {}s)", identity.id, self.ttl_secs);
        Ok(sess)
    }

    /// Re-write an existing session with a fresh TTL. `None` when it was
    /// revoked after being loaded.
    pub async fn touch(&self, mut sess: Session) -> AppResult<Option<Session>> {
        sess.refreshed_at = self.clock.now();
        if !self.rewrite(&sess).await? { return Ok(None); }
        Ok(Some(sess))
    }

    pub async fn load(&self, user_id: &str) -> AppResult<Option<Session>> {
        let Some(raw) = self.cache.get(&session_key(user_id)).await? else { return Ok(None); };
        match serde_json::from_str::<Session>(&raw) {
            Ok(s) => Ok(Some(s)),
            Err(e) => {
                // An unreadable entry cannot authorize anything; drop it.
                tracing::warn!(target: "auth", "discarding unreadable session for {}: {}", user_id, e);
                self.cache.delete(&session_key(user_id)).await?;
                Ok(None)
            }
        }
    }

    /// Update the cached identity if a session exists. Returns whether it did.
    /// A session revoked between the load and the write stays revoked.
    pub async fn replace_identity(&self, identity: &Identity) -> AppResult<bool> {
        let Some(mut sess) = self.load(&identity.id).await? else { return Ok(false); };
        sess.identity = identity.clone();
        self.rewrite(&sess).await
    }

    pub async fn revoke(&self, user_id: &str) -> AppResult<bool> {
        let removed = self.cache.delete(&session_key(user_id)).await?;
        tracing::debug!(target: "auth", "session revoke for {}: removed={}", user_id, removed);
        Ok(removed)
    }

    async fn write(&self, sess: &Session) -> AppResult<()> {
        let raw = encode(sess)?;
        self.cache.set(&session_key(&sess.identity.id), &raw, self.ttl_secs).await
    }

    async fn rewrite(&self, sess: &Session) -> AppResult<bool> {
        let raw = encode(sess)?;
        self.cache.set_if_present(&session_key(&sess.identity.id), &raw, self.ttl_secs).await
    }
}

fn encode(sess: &Session) -> AppResult<String> {
    serde_json::to_string(sess)
        .map_err(|e| AppError::internal("session_encoding".to_string(), e.to_string()))
}
