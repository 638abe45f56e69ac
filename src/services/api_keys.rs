//! Issuance, lookup, and revocation of opaque bearer API keys.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::tokens;
use crate::clock::Clock;
use crate::db::{self, ApiKeyRecord, Store, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyStatus {
    Active,
    Revoked,
    Expired,
}

impl ApiKeyStatus {
    #[must_use]
    pub fn of(record: &ApiKeyRecord, now: DateTime<Utc>) -> Self {
        if record.revoked {
            Self::Revoked
        } else if record.expires_at.is_some_and(|at| at <= now) {
            Self::Expired
        } else {
            Self::Active
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

/// Key metadata safe to show to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyInfo {
    pub id: i32,
    pub label: String,
    pub status: ApiKeyStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiKeyInfo {
    fn from_record(record: ApiKeyRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: ApiKeyStatus::of(&record, now),
            id: record.id,
            label: record.label,
            created_at: record.created_at,
            expires_at: record.expires_at,
            last_used: record.last_used,
        }
    }
}

/// A freshly minted key. `token` is never retrievable again.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    pub token: String,
    pub info: ApiKeyInfo,
}

pub struct ApiKeyManager {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl ApiKeyManager {
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Mint a key for `user_id`. The label must already be validated.
    pub async fn issue(
        &self,
        user_id: i32,
        label: &str,
        ttl: Option<Duration>,
    ) -> Result<IssuedApiKey> {
        let now = self.clock.now();
        let expires_at = ttl.map(|ttl| now + ttl);
        let token = tokens::generate_token();
        let key_hash = tokens::hash_token(&token);

        let record = self
            .store
            .insert_api_key(user_id, &key_hash, label, now, expires_at)
            .await?;

        metrics::counter!("api_keys_issued_total").increment(1);
        info!(user_id, key_id = record.id, label, "API key issued");

        Ok(IssuedApiKey {
            token,
            info: ApiKeyInfo::from_record(record, now),
        })
    }

    /// Resolve a presented bearer token to its owner.
    ///
    /// Returns `None` for unknown, revoked, and expired keys alike.
    pub async fn resolve(&self, token: &str) -> Result<Option<User>> {
        if !tokens::looks_like_token(token) {
            return Ok(None);
        }

        let now = self.clock.now();
        let presented_hash = tokens::hash_token(token);

        let Some((record, stored_hash)) = db::retry_once("find_api_key", || {
            self.store.find_api_key(&presented_hash)
        })
        .await?
        else {
            return Ok(None);
        };

        if !tokens::digests_match(&stored_hash, &presented_hash) {
            return Ok(None);
        }

        let status = ApiKeyStatus::of(&record, now);
        if status != ApiKeyStatus::Active {
            debug!(key_id = record.id, status = status.as_str(), "Rejected API key");
            return Ok(None);
        }

        self.store.touch_api_key(record.id, now).await?;

        self.store.get_user(record.user_id).await
    }

    /// Revoke a key owned by `user_id`. Keys owned by anyone else, and keys
    /// that do not exist, both report `false`.
    pub async fn revoke(&self, user_id: i32, key_id: i32) -> Result<bool> {
        let revoked = db::retry_once("revoke_api_key", || {
            self.store.revoke_api_key(user_id, key_id)
        })
        .await?;

        if revoked {
            metrics::counter!("api_keys_revoked_total").increment(1);
            info!(user_id, key_id, "API key revoked");
        }

        Ok(revoked)
    }

    pub async fn list(&self, user_id: i32) -> Result<Vec<ApiKeyInfo>> {
        let now = self.clock.now();
        let keys = self.store.list_api_keys(user_id).await?;

        Ok(keys
            .into_iter()
            .map(|record| ApiKeyInfo::from_record(record, now))
            .collect())
    }
}
