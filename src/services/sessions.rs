//! Short-lived login sessions carried as opaque bearer tokens.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::tokens;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::db::{self, Store, User};

#[derive(Debug, Clone, Serialize)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct SessionManager {
    store: Store,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Store, config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    fn lifetime(&self, remember: bool) -> Duration {
        if remember {
            Duration::days(i64::from(self.config.remember_me_days))
        } else {
            Duration::minutes(i64::from(self.config.lifetime_minutes))
        }
    }

    pub async fn issue(&self, user_id: i32, remember: bool) -> Result<IssuedSession> {
        let now = self.clock.now();
        let expires_at = now + self.lifetime(remember);
        let token = tokens::generate_token();

        let record = self
            .store
            .insert_session(user_id, &tokens::hash_token(&token), now, expires_at)
            .await?;

        debug!(user_id, session_id = record.id, remember, "Session issued");

        Ok(IssuedSession { token, expires_at })
    }

    /// Resolve a session token to its user; expired sessions resolve to `None`.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>> {
        if !tokens::looks_like_token(token) {
            return Ok(None);
        }

        let now = self.clock.now();
        let presented_hash = tokens::hash_token(token);

        let Some((record, stored_hash)) = db::retry_once("find_session", || {
            self.store.find_session(&presented_hash)
        })
        .await?
        else {
            return Ok(None);
        };

        if !tokens::digests_match(&stored_hash, &presented_hash) || record.expires_at <= now {
            return Ok(None);
        }

        self.store.touch_session(record.id, now).await?;

        self.store.get_user(record.user_id).await
    }

    pub async fn revoke(&self, token: &str) -> Result<bool> {
        if !tokens::looks_like_token(token) {
            return Ok(false);
        }

        self.store.delete_session(&tokens::hash_token(token)).await
    }

    pub async fn revoke_all(&self, user_id: i32) -> Result<u64> {
        let removed = self.store.delete_user_sessions(user_id).await?;
        if removed > 0 {
            info!(user_id, removed, "Revoked all sessions");
        }
        Ok(removed)
    }
}
