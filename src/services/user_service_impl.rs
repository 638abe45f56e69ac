//! `SeaORM` implementation of the `UserService` trait.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::{BootstrapConfig, Config};
use crate::constants::bootstrap::{ADMIN_PASSWORD_ENV, DEFAULT_ADMIN_PASSWORD};
use crate::db::{self, NewUserRecord, Store, User, UserFlagsUpdate};
use crate::services::auth_service::Identity;
use crate::services::credentials::CredentialVerifier;
use crate::services::lockout::{LockoutPolicy, LockoutTracker};
use crate::services::user_service::{AdminUserUpdate, NewUser, UserError, UserProfile, UserService};
use crate::services::validation;

pub struct SeaOrmUserService {
    store: Store,
    config: Arc<Config>,
    clock: Arc<dyn Clock>,
    verifier: CredentialVerifier,
    lockout: LockoutTracker,
}

impl SeaOrmUserService {
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

        Self {
            store,
            config,
            clock,
            verifier,
            lockout,
        }
    }

    /// The admin flag is re-read from storage; a stale identity cannot act
    /// with privileges it has since lost.
    async fn require_admin(&self, actor: &Identity) -> Result<(), UserError> {
        let current = self.store.get_user(actor.user_id).await?;

        match current {
            Some(user) if user.is_admin && user.is_active => Ok(()),
            _ => Err(UserError::Forbidden(
                "Administrator privileges required".to_string(),
            )),
        }
    }

    async fn find_by_username(&self, username: &str) -> Result<User, UserError> {
        self.store
            .get_user_by_username(username.trim())
            .await?
            .ok_or_else(|| UserError::NotFound(username.trim().to_string()))
    }

    async fn checked_email(&self, email: &str, except_id: Option<i32>) -> Result<String, UserError> {
        let email = validation::normalize_email(email)?;
        if self.store.email_taken(&email, except_id).await? {
            return Err(UserError::Conflict("Email already registered".to_string()));
        }
        Ok(email)
    }

    async fn create_account(&self, record: NewUserRecord) -> Result<User, UserError> {
        let username = record.username.clone();

        match self.store.create_user(record, self.clock.now()).await {
            Ok(user) => Ok(user),
            Err(e) if db::is_unique_violation(&e) => Err(UserError::Conflict(format!(
                "Username or email already taken: {username}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    fn bootstrap_password(bootstrap: &BootstrapConfig) -> String {
        if let Ok(password) = std::env::var(ADMIN_PASSWORD_ENV) {
            if !password.is_empty() {
                return password;
            }
        }

        if let Some(password) = bootstrap.admin_password.as_deref().filter(|p| !p.is_empty()) {
            return password.to_string();
        }

        warn!(
            "Bootstrap admin created with the default password; set {} or change it immediately",
            ADMIN_PASSWORD_ENV
        );
        DEFAULT_ADMIN_PASSWORD.to_string()
    }
}

#[async_trait]
impl UserService for SeaOrmUserService {
    async fn register(&self, new_user: NewUser) -> Result<UserProfile, UserError> {
        let username = validation::validate_username(&new_user.username)?.to_string();
        validation::normalize_email(&new_user.email)?;
        validation::validate_password(&new_user.password, &self.config.security.password_policy)?;

        if self.store.get_user_by_username(&username).await?.is_some() {
            return Err(UserError::Conflict("Username already exists".to_string()));
        }
        let email = self.checked_email(&new_user.email, None).await?;

        let password_hash = self.verifier.hash(&new_user.password).await?;
        let user = self
            .create_account(NewUserRecord {
                username,
                email,
                password_hash,
                is_admin: false,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "User registered");

        Ok(UserProfile::from(user))
    }

    async fn profile(&self, identity: &Identity) -> Result<UserProfile, UserError> {
        let user = self
            .store
            .get_user(identity.user_id)
            .await?
            .ok_or_else(|| UserError::NotFound(identity.username.clone()))?;

        Ok(UserProfile::from(user))
    }

    async fn update_email(
        &self,
        identity: &Identity,
        email: &str,
    ) -> Result<UserProfile, UserError> {
        let email = self.checked_email(email, Some(identity.user_id)).await?;

        let user = self
            .store
            .update_user_flags(
                identity.user_id,
                UserFlagsUpdate {
                    email: Some(email),
                    ..UserFlagsUpdate::default()
                },
                self.clock.now(),
            )
            .await?
            .ok_or_else(|| UserError::NotFound(identity.username.clone()))?;

        Ok(UserProfile::from(user))
    }

    async fn list_users(&self, actor: &Identity) -> Result<Vec<UserProfile>, UserError> {
        self.require_admin(actor).await?;

        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    async fn get_user(&self, actor: &Identity, username: &str) -> Result<UserProfile, UserError> {
        self.require_admin(actor).await?;

        Ok(UserProfile::from(self.find_by_username(username).await?))
    }

    async fn update_user(
        &self,
        actor: &Identity,
        username: &str,
        update: AdminUserUpdate,
    ) -> Result<UserProfile, UserError> {
        self.require_admin(actor).await?;
        let target = self.find_by_username(username).await?;

        if target.id == actor.user_id
            && (update.is_active == Some(false) || update.is_admin == Some(false))
        {
            return Err(UserError::Forbidden(
                "Cannot deactivate or demote your own account".to_string(),
            ));
        }

        let email = match update.email.as_deref() {
            Some(email) => Some(self.checked_email(email, Some(target.id)).await?),
            None => None,
        };

        let user = self
            .store
            .update_user_flags(
                target.id,
                UserFlagsUpdate {
                    is_active: update.is_active,
                    is_admin: update.is_admin,
                    email,
                },
                self.clock.now(),
            )
            .await?
            .ok_or_else(|| UserError::NotFound(username.to_string()))?;

        info!(
            actor = %actor.username,
            target = %user.username,
            is_active = user.is_active,
            is_admin = user.is_admin,
            "User updated"
        );

        Ok(UserProfile::from(user))
    }

    async fn delete_user(&self, actor: &Identity, username: &str) -> Result<(), UserError> {
        self.require_admin(actor).await?;
        let target = self.find_by_username(username).await?;

        if target.id == actor.user_id {
            return Err(UserError::Forbidden(
                "Cannot delete your own account".to_string(),
            ));
        }

        if !self.store.delete_user(target.id).await? {
            return Err(UserError::NotFound(username.to_string()));
        }

        info!(actor = %actor.username, target = %target.username, "User deleted");
        Ok(())
    }

    async fn unlock_user(&self, actor: &Identity, username: &str) -> Result<(), UserError> {
        self.require_admin(actor).await?;
        let target = self.find_by_username(username).await?;

        if !self.lockout.unlock(target.id).await? {
            return Err(UserError::NotFound(username.to_string()));
        }

        Ok(())
    }

    async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> Result<bool, UserError> {
        if !bootstrap.create_admin {
            return Ok(false);
        }

        let username = validation::validate_username(&bootstrap.admin_username)?.to_string();
        if self.store.get_user_by_username(&username).await?.is_some() {
            return Ok(false);
        }

        let email = validation::normalize_email(&bootstrap.admin_email)?;
        let password = Self::bootstrap_password(bootstrap);
        let password_hash = self.verifier.hash(&password).await?;

        let user = self
            .create_account(NewUserRecord {
                username,
                email,
                password_hash,
                is_admin: true,
            })
            .await?;

        info!(user_id = user.id, username = %user.username, "Bootstrap admin created");
        Ok(true)
    }
}
