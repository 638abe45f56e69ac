use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;

use crate::entities::{api_keys, sessions, users};

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            is_active: model.is_active,
            is_admin: model.is_admin,
            failed_login_count: model.failed_login_count,
            locked_until: model.locked_until,
            last_login: model.last_login,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A user together with the stored password hash, for verification only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

impl From<users::Model> for UserCredentials {
    fn from(model: users::Model) -> Self {
        let password_hash = model.password_hash.clone();
        Self {
            user: User::from(model),
            password_hash,
        }
    }
}

/// Lockout-relevant slice of a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub failed_login_count: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl From<&users::Model> for LockoutState {
    fn from(model: &users::Model) -> Self {
        Self {
            failed_login_count: model.failed_login_count,
            locked_until: model.locked_until,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
}

/// Partial update applied by administrators.
#[derive(Debug, Clone, Default)]
pub struct UserFlagsUpdate {
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
    pub email: Option<String>,
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, record: NewUserRecord, now: DateTime<Utc>) -> Result<User> {
        let active = users::ActiveModel {
            username: Set(record.username),
            email: Set(record.email),
            password_hash: Set(record.password_hash),
            is_active: Set(true),
            is_admin: Set(record.is_admin),
            failed_login_count: Set(0),
            last_failed_login: Set(None),
            locked_until: Set(None),
            last_login: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert user")?;

        Ok(User::from(model))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> Result<Option<User>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    /// Get user by username
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        let mut query = users::Entity::find().filter(users::Column::Email.eq(email));
        if let Some(id) = except_id {
            query = query.filter(users::Column::Id.ne(id));
        }

        let user = query
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user.is_some())
    }

    /// Look up a login identifier, which may be a username or an email address.
    pub async fn find_credentials(&self, identifier: &str) -> Result<Option<UserCredentials>> {
        let user = users::Entity::find()
            .filter(
                Condition::any()
                    .add(users::Column::Username.eq(identifier))
                    .add(users::Column::Email.eq(identifier.to_lowercase())),
            )
            .order_by_asc(users::Column::Id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        Ok(user.map(UserCredentials::from))
    }

    pub async fn get_credentials_by_id(&self, id: i32) -> Result<Option<UserCredentials>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password verification")?;

        Ok(user.map(UserCredentials::from))
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        let users = users::Entity::find()
            .order_by_asc(users::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        Ok(users.into_iter().map(User::from).collect())
    }

    pub async fn update_password_hash(
        &self,
        id: i32,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(password_hash))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to update password hash")?;

        Ok(result.rows_affected == 1)
    }

    pub async fn update_flags(
        &self,
        id: i32,
        update: UserFlagsUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let Some(user) = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for update")?
        else {
            return Ok(None);
        };

        let mut active: users::ActiveModel = user.into();
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(is_admin) = update.is_admin {
            active.is_admin = Set(is_admin);
        }
        if let Some(email) = update.email {
            active.email = Set(email);
        }
        active.updated_at = Set(now);

        let model = active
            .update(&self.conn)
            .await
            .context("Failed to update user")?;

        Ok(Some(User::from(model)))
    }

    /// Delete a user together with every key and session it owns.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let txn = self.conn.begin().await?;

        api_keys::Entity::delete_many()
            .filter(api_keys::Column::UserId.eq(id))
            .exec(&txn)
            .await
            .context("Failed to delete user API keys")?;

        sessions::Entity::delete_many()
            .filter(sessions::Column::UserId.eq(id))
            .exec(&txn)
            .await
            .context("Failed to delete user sessions")?;

        let result = users::Entity::delete_by_id(id)
            .exec(&txn)
            .await
            .context("Failed to delete user")?;

        txn.commit().await?;

        Ok(result.rows_affected == 1)
    }

    pub async fn lockout_state(&self, id: i32) -> Result<Option<LockoutState>> {
        let user = users::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query lockout state")?;

        Ok(user.as_ref().map(LockoutState::from))
    }

    /// Count one failed login and lock the account once `max_attempts` is reached.
    ///
    /// The increment is a single `count = count + 1` statement guarded by
    /// `count < max_attempts`, so concurrent callers serialize on the row write
    /// and none of them is lost. The returned flag is true only for the call
    /// that wrote `locked_until`.
    pub async fn record_failed_login(
        &self,
        id: i32,
        now: DateTime<Utc>,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<(LockoutState, bool)>> {
        let txn = self.conn.begin().await?;

        users::Entity::update_many()
            .col_expr(
                users::Column::FailedLoginCount,
                Expr::col(users::Column::FailedLoginCount).add(1),
            )
            .col_expr(users::Column::LastFailedLogin, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::FailedLoginCount.lt(max_attempts))
            .exec(&txn)
            .await
            .context("Failed to increment failed login count")?;

        let Some(user) = users::Entity::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read failed login count")?
        else {
            txn.rollback().await?;
            return Ok(None);
        };

        let mut state = LockoutState::from(&user);
        let lock_now = state.failed_login_count >= max_attempts
            && state.locked_until.is_none_or(|until| until <= now);

        if lock_now {
            users::Entity::update_many()
                .col_expr(users::Column::LockedUntil, Expr::value(lock_until))
                .filter(users::Column::Id.eq(id))
                .exec(&txn)
                .await
                .context("Failed to lock account")?;
            state.locked_until = Some(lock_until);
        }

        txn.commit().await?;

        Ok(Some((state, lock_now)))
    }

    /// Clear an elapsed lock, but only if nobody changed it since it was read.
    pub async fn clear_expired_lock(&self, id: i32, observed_until: DateTime<Utc>) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(users::Column::FailedLoginCount, Expr::value(0))
            .filter(users::Column::Id.eq(id))
            .filter(users::Column::LockedUntil.eq(observed_until))
            .exec(&self.conn)
            .await
            .context("Failed to clear expired lock")?;

        Ok(result.rows_affected == 1)
    }

    /// Reset the lockout fields and stamp `last_login`, unless a lock that is
    /// still in force was written since the password was checked.
    ///
    /// Returns the state after the attempt; a `locked_until` later than `now`
    /// means the reset was refused.
    pub async fn record_successful_login(
        &self,
        id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutState>> {
        let txn = self.conn.begin().await?;

        users::Entity::update_many()
            .col_expr(users::Column::FailedLoginCount, Expr::value(0))
            .col_expr(
                users::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                users::Column::LastFailedLogin,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(users::Column::LastLogin, Expr::value(now))
            .filter(users::Column::Id.eq(id))
            .filter(
                Condition::any()
                    .add(users::Column::LockedUntil.is_null())
                    .add(users::Column::LockedUntil.lte(now)),
            )
            .exec(&txn)
            .await
            .context("Failed to record successful login")?;

        let user = users::Entity::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to re-read lockout state")?;

        txn.commit().await?;

        Ok(user.as_ref().map(LockoutState::from))
    }

    /// Reset every lockout field; `last_login` is stamped when given.
    pub async fn reset_lockout(&self, id: i32, last_login: Option<DateTime<Utc>>) -> Result<bool> {
        let mut update = users::Entity::update_many()
            .col_expr(users::Column::FailedLoginCount, Expr::value(0))
            .col_expr(
                users::Column::LockedUntil,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(
                users::Column::LastFailedLogin,
                Expr::value(Option::<DateTime<Utc>>::None),
            );

        if let Some(at) = last_login {
            update = update.col_expr(users::Column::LastLogin, Expr::value(at));
        }

        let result = update
            .filter(users::Column::Id.eq(id))
            .exec(&self.conn)
            .await
            .context("Failed to reset lockout state")?;

        Ok(result.rows_affected == 1)
    }
}
