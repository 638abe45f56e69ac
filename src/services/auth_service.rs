//! Domain service for authentication.
//!
//! Handles login (lockout gate, credential check, token minting), bearer
//! token and session authentication, password changes, and API key
//! management. Callers always pass the acting [`Identity`] explicitly.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use super::api_keys::{ApiKeyInfo, IssuedApiKey};
use super::sessions::IssuedSession;
use super::validation::ValidationError;
use crate::db::User;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier and wrong password are deliberately the same error.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Invalid or expired token")]
    TokenInvalid,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Short machine-readable reason for a rejected login.
    #[must_use]
    pub const fn reason(&self) -> Option<&'static str> {
        match self {
            Self::AccountLocked { .. } => Some("locked"),
            Self::InvalidCredentials => Some("bad_credentials"),
            Self::AccountDisabled => Some("disabled"),
            _ => None,
        }
    }

    /// How long a locked-out caller should wait before trying again.
    #[must_use]
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::AccountLocked { until } => Some((*until - now).max(Duration::zero())),
            _ => None,
        }
    }
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<ValidationError> for AuthError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.0)
    }
}

/// The authenticated principal a request acts as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: i32,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// What to mint after a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IssueOnLogin {
    #[default]
    Nothing,
    /// A new API key; the label falls back to `api_keys.login_key_label`.
    ApiKey { label: Option<String> },
    Session { remember: bool },
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Username or email address.
    pub identifier: String,
    pub password: String,
    pub issue: IssueOnLogin,
}

impl LoginRequest {
    #[must_use]
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
            issue: IssueOnLogin::Nothing,
        }
    }

    #[must_use]
    pub fn with_issue(mut self, issue: IssueOnLogin) -> Self {
        self.issue = issue;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginSuccess {
    pub identity: Identity,
    pub api_key: Option<IssuedApiKey>,
    pub session: Option<IssuedSession>,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Runs a login attempt through the lockout gate and credential check.
    ///
    /// # Errors
    ///
    /// - [`AuthError::AccountLocked`] if the account is locked, including
    ///   when this attempt is the one that trips the lock.
    /// - [`AuthError::InvalidCredentials`] for an unknown identifier or a
    ///   wrong password.
    /// - [`AuthError::AccountDisabled`] for a correct password on an
    ///   inactive account.
    async fn login(&self, request: LoginRequest) -> Result<LoginSuccess, AuthError>;

    /// Resolves a bearer API key to the identity that owns it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenInvalid`] for unknown, revoked, or expired keys.
    async fn authenticate_api_key(&self, token: &str) -> Result<Identity, AuthError>;

    /// Resolves a session token to the identity that owns it.
    async fn authenticate_session(&self, token: &str) -> Result<Identity, AuthError>;

    /// Ends a session. Unknown tokens are ignored.
    async fn logout(&self, session_token: &str) -> Result<(), AuthError>;

    /// Mints a new API key for the caller. The token is only returned here.
    async fn issue_api_key(
        &self,
        identity: &Identity,
        label: &str,
        expires_in_days: Option<u32>,
    ) -> Result<IssuedApiKey, AuthError>;

    async fn list_api_keys(&self, identity: &Identity) -> Result<Vec<ApiKeyInfo>, AuthError>;

    /// Revokes one of the caller's keys.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] when the key does not exist or belongs
    /// to another user.
    async fn revoke_api_key(&self, identity: &Identity, key_id: i32) -> Result<(), AuthError>;

    /// Changes the caller's password and ends all of their sessions.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] if the current password is wrong, the
    /// new one equals the old one, or it fails the password policy.
    async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
}
