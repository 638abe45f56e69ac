//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::db::{self, Store, User, UserCredentials};
use crate::services::api_keys::{ApiKeyInfo, ApiKeyManager, IssuedApiKey};
use crate::services::auth_service::{
    AuthError, AuthService, Identity, IssueOnLogin, LoginRequest, LoginSuccess,
};
use crate::services::credentials::CredentialVerifier;
use crate::services::lockout::{FailureOutcome, LockStatus, LockoutPolicy, LockoutTracker};
use crate::services::sessions::SessionManager;
use crate::services::validation;

const DEFAULT_LOGIN_KEY_LABEL: &str = "login";

pub struct SeaOrmAuthService {
    store: Store,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    verifier: CredentialVerifier,
    lockout: LockoutTracker,
    api_keys: ApiKeyManager,
    sessions: SessionManager,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(
        store: Store,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        verifier: CredentialVerifier,
    ) -> Self {
        let lockout = LockoutTracker::new(
            store.clone(),
            LockoutPolicy::from(&config.security.lockout),
            clock.clone(),
        );
        let api_keys = ApiKeyManager::new(store.clone(), clock.clone());
        let sessions = SessionManager::new(store.clone(), config.sessions.clone(), clock.clone());

        Self {
            store,
            config,
            clock,
            verifier,
            lockout,
            api_keys,
            sessions,
        }
    }

    fn record_attempt(outcome: &'static str) {
        metrics::counter!("auth_login_attempts_total", "outcome" => outcome).increment(1);
    }

    /// Reject a login attempt, recording its outcome first.
    fn reject(err: AuthError) -> AuthError {
        if let Some(reason) = err.reason() {
            Self::record_attempt(reason);
        }
        err
    }

    async fn lookup_credentials(&self, identifier: &str) -> Result<Option<UserCredentials>, AuthError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }

        Ok(db::retry_once("find_user_credentials", || {
            self.store.find_user_credentials(identifier)
        })
        .await?)
    }

    /// Upgrade a hash produced with outdated parameters. Never fails the login.
    async fn migrate_password_hash(&self, user_id: i32, stored_hash: &str, password: &str) {
        if !self.config.security.auto_migrate_password_hashes
            || !self.verifier.needs_rehash(stored_hash)
        {
            return;
        }

        let result = async {
            let new_hash = self.verifier.hash(password).await?;
            self.store
                .update_user_password_hash(user_id, &new_hash, self.clock.now())
                .await
        }
        .await;

        match result {
            Ok(_) => info!(user_id, "Migrated password hash to current parameters"),
            Err(e) => warn!(user_id, error = %e, "Failed to migrate password hash"),
        }
    }

    fn login_key_label(&self, requested: Option<&str>) -> Result<String, AuthError> {
        let label = requested
            .or(self.config.api_keys.login_key_label.as_deref())
            .unwrap_or(DEFAULT_LOGIN_KEY_LABEL);

        Ok(validation::validate_key_label(label)?.to_string())
    }

    fn default_key_ttl(&self, expires_in_days: Option<u32>) -> Option<Duration> {
        expires_in_days
            .or(self.config.api_keys.default_expiry_days)
            .map(|days| Duration::days(i64::from(days)))
    }

    fn active_identity(user: Option<User>) -> Result<Identity, AuthError> {
        let user = user.ok_or(AuthError::TokenInvalid)?;
        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }
        Ok(Identity::from(&user))
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, request: LoginRequest) -> Result<LoginSuccess, AuthError> {
        let key_label = match &request.issue {
            IssueOnLogin::ApiKey { label } => Some(self.login_key_label(label.as_deref())?),
            _ => None,
        };

        let (credentials, _attempt) = match self.lookup_credentials(&request.identifier).await? {
            Some(found) => {
                let attempt = self.lockout.begin_attempt(found.user.id).await;
                // Re-read under the guard; a queued attempt may have waited out a
                // password change or an admin update.
                let fresh = db::retry_once("get_user_credentials", || {
                    self.store.get_user_credentials(found.user.id)
                })
                .await?;
                (fresh, Some(attempt))
            }
            None => (None, None),
        };

        if let Some(creds) = &credentials {
            if let LockStatus::Locked { until } = self.lockout.status(creds.user.id).await? {
                info!(user_id = creds.user.id, "Login rejected: account locked");
                return Err(Self::reject(AuthError::AccountLocked { until }));
            }
        }

        let matched = self
            .verifier
            .verify(credentials.as_ref(), &request.password)
            .await;

        let Some(creds) = credentials else {
            info!("Login failed: unknown identifier");
            return Err(Self::reject(AuthError::InvalidCredentials));
        };
        let user = creds.user;

        if !matched {
            return match self.lockout.record_failure(user.id).await? {
                FailureOutcome::Locked { until } => {
                    Err(Self::reject(AuthError::AccountLocked { until }))
                }
                FailureOutcome::Counted {
                    failed_attempts,
                    remaining,
                } => {
                    info!(
                        user_id = user.id,
                        failed_attempts, remaining, "Login failed: bad password"
                    );
                    Err(Self::reject(AuthError::InvalidCredentials))
                }
            };
        }

        if !user.is_active {
            info!(user_id = user.id, "Login rejected: account disabled");
            return Err(Self::reject(AuthError::AccountDisabled));
        }

        if let LockStatus::Locked { until } = self.lockout.complete_login(user.id).await? {
            info!(user_id = user.id, "Login rejected: account locked during verification");
            return Err(Self::reject(AuthError::AccountLocked { until }));
        }
        self.migrate_password_hash(user.id, &creds.password_hash, &request.password)
            .await;

        let mut success = LoginSuccess {
            identity: Identity::from(&user),
            api_key: None,
            session: None,
        };

        if let Some(label) = key_label {
            success.api_key = Some(
                self.api_keys
                    .issue(user.id, &label, self.default_key_ttl(None))
                    .await?,
            );
        }
        if let IssueOnLogin::Session { remember } = request.issue {
            success.session = Some(self.sessions.issue(user.id, remember).await?);
        }

        Self::record_attempt("success");
        info!(user_id = user.id, username = %user.username, "Login succeeded");

        Ok(success)
    }

    async fn authenticate_api_key(&self, token: &str) -> Result<Identity, AuthError> {
        Self::active_identity(self.api_keys.resolve(token).await?)
    }

    async fn authenticate_session(&self, token: &str) -> Result<Identity, AuthError> {
        Self::active_identity(self.sessions.resolve(token).await?)
    }

    async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(session_token).await?;
        Ok(())
    }

    async fn issue_api_key(
        &self,
        identity: &Identity,
        label: &str,
        expires_in_days: Option<u32>,
    ) -> Result<IssuedApiKey, AuthError> {
        let label = validation::validate_key_label(label)?;
        if expires_in_days == Some(0) {
            return Err(AuthError::Validation(
                "Expiry must be at least one day".to_string(),
            ));
        }

        Ok(self
            .api_keys
            .issue(identity.user_id, label, self.default_key_ttl(expires_in_days))
            .await?)
    }

    async fn list_api_keys(&self, identity: &Identity) -> Result<Vec<ApiKeyInfo>, AuthError> {
        Ok(self.api_keys.list(identity.user_id).await?)
    }

    async fn revoke_api_key(&self, identity: &Identity, key_id: i32) -> Result<(), AuthError> {
        if self.api_keys.revoke(identity.user_id, key_id).await? {
            Ok(())
        } else {
            Err(AuthError::NotFound(format!("API key {key_id}")))
        }
    }

    async fn change_password(
        &self,
        identity: &Identity,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let _attempt = self.lockout.begin_attempt(identity.user_id).await;
        let creds = self
            .store
            .get_user_credentials(identity.user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("User {}", identity.username)))?;

        if !self.verifier.verify(Some(&creds), current_password).await {
            return Err(AuthError::Validation(
                "Current password is incorrect".to_string(),
            ));
        }

        if current_password == new_password {
            return Err(AuthError::Validation(
                "New password must be different from current password".to_string(),
            ));
        }

        validation::validate_password(new_password, &self.config.security.password_policy)?;

        let new_hash = self.verifier.hash(new_password).await?;
        self.store
            .update_user_password_hash(identity.user_id, &new_hash, self.clock.now())
            .await?;

        let revoked = self.sessions.revoke_all(identity.user_id).await?;
        info!(
            user_id = identity.user_id,
            revoked_sessions = revoked,
            "Password changed"
        );

        Ok(())
    }
}
