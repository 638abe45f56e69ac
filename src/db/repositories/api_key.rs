use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::api_keys;

/// API key metadata; the key hash never leaves the repository except for
/// the constant-time re-check in [`ApiKeyRepository::find_by_hash`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub id: i32,
    pub user_id: i32,
    pub label: String,
    pub revoked: bool,
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<api_keys::Model> for ApiKeyRecord {
    fn from(model: api_keys::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            label: model.label,
            revoked: model.revoked,
            last_used: model.last_used,
            created_at: model.created_at,
            expires_at: model.expires_at,
        }
    }
}

pub struct ApiKeyRepository {
    conn: DatabaseConnection,
}

impl ApiKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        user_id: i32,
        key_hash: &str,
        label: &str,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyRecord> {
        let active = api_keys::ActiveModel {
            user_id: Set(user_id),
            key_hash: Set(key_hash.to_string()),
            label: Set(label.to_string()),
            revoked: Set(false),
            last_used: Set(None),
            created_at: Set(now),
            expires_at: Set(expires_at),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert API key")?;

        Ok(ApiKeyRecord::from(model))
    }

    /// Point lookup on the unique `key_hash` index.
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<(ApiKeyRecord, String)>> {
        let key = api_keys::Entity::find()
            .filter(api_keys::Column::KeyHash.eq(key_hash))
            .one(&self.conn)
            .await
            .context("Failed to query API key by hash")?;

        Ok(key.map(|k| {
            let stored_hash = k.key_hash.clone();
            (ApiKeyRecord::from(k), stored_hash)
        }))
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<ApiKeyRecord>> {
        let keys = api_keys::Entity::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .order_by_asc(api_keys::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list API keys")?;

        Ok(keys.into_iter().map(ApiKeyRecord::from).collect())
    }

    /// Flag a key revoked. Matches only keys owned by `user_id`.
    pub async fn revoke(&self, user_id: i32, key_id: i32) -> Result<bool> {
        let result = api_keys::Entity::update_many()
            .col_expr(api_keys::Column::Revoked, Expr::value(true))
            .filter(api_keys::Column::Id.eq(key_id))
            .filter(api_keys::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to revoke API key")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn touch(&self, key_id: i32, now: DateTime<Utc>) -> Result<()> {
        api_keys::Entity::update_many()
            .col_expr(api_keys::Column::LastUsed, Expr::value(now))
            .filter(api_keys::Column::Id.eq(key_id))
            .exec(&self.conn)
            .await
            .context("Failed to record API key usage")?;

        Ok(())
    }
}
