//! Domain service for user accounts.
//!
//! Registration, self-service profile updates, and administrator-only
//! account management.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::auth_service::Identity;
use super::validation::ValidationError;
use crate::config::BootstrapConfig;
use crate::db::User;

/// Errors specific to user operations.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for UserError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for UserError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ValidationError> for UserError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Fields an administrator may change on another account.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUserUpdate {
    pub is_active: Option<bool>,
    pub is_admin: Option<bool>,
    pub email: Option<String>,
}

/// Account view without any credential material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub failed_login_count: i32,
    pub locked_until: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            is_admin: user.is_admin,
            failed_login_count: user.failed_login_count,
            locked_until: user.locked_until.map(|t| t.to_rfc3339()),
            last_login: user.last_login.map(|t| t.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Domain service trait for user accounts.
#[async_trait::async_trait]
pub trait UserService: Send + Sync {
    /// Creates a regular (non-admin) account.
    ///
    /// # Errors
    ///
    /// - [`UserError::Validation`] if any field is malformed or the password
    ///   fails the policy.
    /// - [`UserError::Conflict`] if the username or email is taken.
    async fn register(&self, new_user: NewUser) -> Result<UserProfile, UserError>;

    async fn profile(&self, identity: &Identity) -> Result<UserProfile, UserError>;

    /// Changes the caller's email address.
    async fn update_email(&self, identity: &Identity, email: &str)
    -> Result<UserProfile, UserError>;

    // Administration. Every method below returns `Forbidden` for non-admins.

    async fn list_users(&self, actor: &Identity) -> Result<Vec<UserProfile>, UserError>;

    async fn get_user(&self, actor: &Identity, username: &str) -> Result<UserProfile, UserError>;

    async fn update_user(
        &self,
        actor: &Identity,
        username: &str,
        update: AdminUserUpdate,
    ) -> Result<UserProfile, UserError>;

    /// Deletes an account with its keys and sessions.
    ///
    /// # Errors
    ///
    /// Returns [`UserError::Forbidden`] when an admin targets their own account.
    async fn delete_user(&self, actor: &Identity, username: &str) -> Result<(), UserError>;

    async fn unlock_user(&self, actor: &Identity, username: &str) -> Result<(), UserError>;

    /// Creates the configured administrator if no account has that username.
    ///
    /// Returns `true` when an account was created.
    async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> Result<bool, UserError>;
}
