use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::entities::sessions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<sessions::Model> for SessionRecord {
    fn from(model: sessions::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            created_at: model.created_at,
            expires_at: model.expires_at,
            last_seen: model.last_seen,
        }
    }
}

pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn insert(
        &self,
        user_id: i32,
        token_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        let active = sessions::ActiveModel {
            user_id: Set(user_id),
            token_hash: Set(token_hash.to_string()),
            created_at: Set(now),
            expires_at: Set(expires_at),
            last_seen: Set(None),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert session")?;

        Ok(SessionRecord::from(model))
    }

    pub async fn find_by_hash(&self, token_hash: &str) -> Result<Option<(SessionRecord, String)>> {
        let session = sessions::Entity::find()
            .filter(sessions::Column::TokenHash.eq(token_hash))
            .one(&self.conn)
            .await
            .context("Failed to query session by hash")?;

        Ok(session.map(|s| {
            let stored_hash = s.token_hash.clone();
            (SessionRecord::from(s), stored_hash)
        }))
    }

    pub async fn touch(&self, session_id: i32, now: DateTime<Utc>) -> Result<()> {
        sessions::Entity::update_many()
            .col_expr(sessions::Column::LastSeen, Expr::value(now))
            .filter(sessions::Column::Id.eq(session_id))
            .exec(&self.conn)
            .await
            .context("Failed to record session activity")?;

        Ok(())
    }

    pub async fn delete_by_hash(&self, token_hash: &str) -> Result<bool> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::TokenHash.eq(token_hash))
            .exec(&self.conn)
            .await
            .context("Failed to delete session")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn delete_for_user(&self, user_id: i32) -> Result<u64> {
        let result = sessions::Entity::delete_many()
            .filter(sessions::Column::UserId.eq(user_id))
            .exec(&self.conn)
            .await
            .context("Failed to delete user sessions")?;

        Ok(result.rows_affected)
    }
}
