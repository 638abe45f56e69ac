use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, SqlErr, Statement};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub mod migrator;
pub mod repositories;

pub use repositories::api_key::ApiKeyRecord;
pub use repositories::session::SessionRecord;
pub use repositories::user::{
    LockoutState, NewUserRecord, User, UserCredentials, UserFlagsUpdate,
};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn api_key_repo(&self) -> repositories::api_key::ApiKeyRepository {
        repositories::api_key::ApiKeyRepository::new(self.conn.clone())
    }

    fn session_repo(&self) -> repositories::session::SessionRepository {
        repositories::session::SessionRepository::new(self.conn.clone())
    }

    pub async fn create_user(&self, record: NewUserRecord, now: DateTime<Utc>) -> Result<User> {
        self.user_repo().create(record, now).await
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn email_taken(&self, email: &str, except_id: Option<i32>) -> Result<bool> {
        self.user_repo().email_taken(email, except_id).await
    }

    pub async fn find_user_credentials(&self, identifier: &str) -> Result<Option<UserCredentials>> {
        self.user_repo().find_credentials(identifier).await
    }

    pub async fn get_user_credentials(&self, id: i32) -> Result<Option<UserCredentials>> {
        self.user_repo().get_credentials_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn update_user_password_hash(
        &self,
        id: i32,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.user_repo()
            .update_password_hash(id, password_hash, now)
            .await
    }

    pub async fn update_user_flags(
        &self,
        id: i32,
        update: UserFlagsUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        self.user_repo().update_flags(id, update, now).await
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    pub async fn get_lockout_state(&self, user_id: i32) -> Result<Option<LockoutState>> {
        self.user_repo().lockout_state(user_id).await
    }

    pub async fn record_failed_login(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
        max_attempts: i32,
        lock_until: DateTime<Utc>,
    ) -> Result<Option<(LockoutState, bool)>> {
        self.user_repo()
            .record_failed_login(user_id, now, max_attempts, lock_until)
            .await
    }

    pub async fn clear_expired_lock(
        &self,
        user_id: i32,
        observed_until: DateTime<Utc>,
    ) -> Result<bool> {
        self.user_repo()
            .clear_expired_lock(user_id, observed_until)
            .await
    }

    pub async fn record_successful_login(
        &self,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<LockoutState>> {
        self.user_repo().record_successful_login(user_id, now).await
    }

    pub async fn reset_lockout(
        &self,
        user_id: i32,
        last_login: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        self.user_repo().reset_lockout(user_id, last_login).await
    }

    pub async fn insert_api_key(
        &self,
        user_id: i32,
        key_hash: &str,
        label: &str,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyRecord> {
        self.api_key_repo()
            .insert(user_id, key_hash, label, now, expires_at)
            .await
    }

    pub async fn find_api_key(&self, key_hash: &str) -> Result<Option<(ApiKeyRecord, String)>> {
        self.api_key_repo().find_by_hash(key_hash).await
    }

    pub async fn list_api_keys(&self, user_id: i32) -> Result<Vec<ApiKeyRecord>> {
        self.api_key_repo().list_for_user(user_id).await
    }

    pub async fn revoke_api_key(&self, user_id: i32, key_id: i32) -> Result<bool> {
        self.api_key_repo().revoke(user_id, key_id).await
    }

    pub async fn touch_api_key(&self, key_id: i32, now: DateTime<Utc>) -> Result<()> {
        self.api_key_repo().touch(key_id, now).await
    }

    pub async fn insert_session(
        &self,
        user_id: i32,
        token_hash: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord> {
        self.session_repo()
            .insert(user_id, token_hash, now, expires_at)
            .await
    }

    pub async fn find_session(&self, token_hash: &str) -> Result<Option<(SessionRecord, String)>> {
        self.session_repo().find_by_hash(token_hash).await
    }

    pub async fn touch_session(&self, session_id: i32, now: DateTime<Utc>) -> Result<()> {
        self.session_repo().touch(session_id, now).await
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<bool> {
        self.session_repo().delete_by_hash(token_hash).await
    }

    pub async fn delete_user_sessions(&self, user_id: i32) -> Result<u64> {
        self.session_repo().delete_for_user(user_id).await
    }
}

/// Run a storage operation, retrying it once if the first attempt fails.
///
/// Each attempt must be a complete transaction; a failed attempt has already
/// been rolled back by the time it is retried.
pub async fn retry_once<T, F, Fut>(operation: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(operation, error = %e, "Storage operation failed, retrying once");
            op().await
        }
    }
}

/// Whether an error (anywhere in its chain) is a unique-constraint violation.
#[must_use]
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<sea_orm::DbErr>())
        .any(|db_err| matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))))
}
