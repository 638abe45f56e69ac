//! Password hashing strategy and the credential verifier built on it.

use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::Arc;
use tokio::task;
use tracing::warn;

use crate::config::SecurityConfig;
use crate::db::UserCredentials;

/// A one-way, salted password hashing scheme.
///
/// Implementations must compare digests in constant time.
pub trait PasswordScheme: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    /// Never errors: malformed stored hashes simply fail verification.
    fn verify(&self, password: &str, encoded_hash: &str) -> bool;

    /// Whether `encoded_hash` was produced with different parameters than
    /// the scheme currently uses.
    fn needs_rehash(&self, encoded_hash: &str) -> bool;

    /// A valid hash of an unguessable secret, verified in place of a real
    /// one when the user does not exist.
    fn dummy_hash(&self) -> &str;
}

/// Argon2id with configurable memory/time/parallelism cost.
pub struct Argon2Scheme {
    params: Params,
    dummy_hash: String,
}

impl Argon2Scheme {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;

        let mut scheme = Self {
            params,
            dummy_hash: String::new(),
        };
        scheme.dummy_hash = scheme
            .hash(&super::tokens::generate_token())
            .context("Failed to prepare dummy password hash")?;

        Ok(scheme)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordScheme for Argon2Scheme {
    fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

        Ok(hash.to_string())
    }

    fn verify(&self, password: &str, encoded_hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(encoded_hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Stored password hash is malformed");
                return false;
            }
        };

        self.argon2()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    }

    fn needs_rehash(&self, encoded_hash: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(encoded_hash) else {
            return false;
        };

        if parsed_hash.algorithm != Algorithm::Argon2id.ident() {
            return true;
        }

        Params::try_from(&parsed_hash).map_or(true, |stored| {
            stored.m_cost() != self.params.m_cost()
                || stored.t_cost() != self.params.t_cost()
                || stored.p_cost() != self.params.p_cost()
        })
    }

    fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

/// Decides whether a submitted password matches a user's stored hash.
///
/// Every call performs exactly one full-cost verification on the blocking
/// pool, including calls for users that do not exist.
#[derive(Clone)]
pub struct CredentialVerifier {
    scheme: Arc<dyn PasswordScheme>,
}

impl CredentialVerifier {
    #[must_use]
    pub fn new(scheme: Arc<dyn PasswordScheme>) -> Self {
        Self { scheme }
    }

    pub async fn verify(&self, user: Option<&UserCredentials>, password: &str) -> bool {
        let encoded_hash = user.map_or_else(
            || self.scheme.dummy_hash().to_string(),
            |u| u.password_hash.clone(),
        );
        let scheme = self.scheme.clone();
        let password = password.to_string();

        let matched = task::spawn_blocking(move || scheme.verify(&password, &encoded_hash))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Password verification task panicked");
                false
            });

        matched && user.is_some()
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let scheme = self.scheme.clone();
        let password = password.to_string();

        task::spawn_blocking(move || scheme.hash(&password))
            .await
            .context("Password hashing task panicked")?
    }

    #[must_use]
    pub fn needs_rehash(&self, encoded_hash: &str) -> bool {
        self.scheme.needs_rehash(encoded_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::User;
    use chrono::Utc;

    fn cheap_config() -> SecurityConfig {
        SecurityConfig {
            argon2_memory_cost_kib: 64,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        }
    }

    fn credentials(password_hash: String) -> UserCredentials {
        let now = Utc::now();
        UserCredentials {
            user: User {
                id: 1,
                username: "admin".to_string(),
                email: "admin@example.com".to_string(),
                is_active: true,
                is_admin: true,
                failed_login_count: 0,
                locked_until: None,
                last_login: None,
                created_at: now,
                updated_at: now,
            },
            password_hash,
        }
    }

    #[test]
    fn test_argon2_hash_and_verify() {
        let scheme = Argon2Scheme::new(&cheap_config()).unwrap();
        let hash = scheme.hash("Correct#Horse1").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(scheme.verify("Correct#Horse1", &hash));
        assert!(!scheme.verify("wrong", &hash));
        assert!(!scheme.verify("Correct#Horse1", "not-a-phc-string"));
    }

    #[test]
    fn test_needs_rehash_when_params_change() {
        let old = Argon2Scheme::new(&cheap_config()).unwrap();
        let hash = old.hash("pw").unwrap();
        assert!(!old.needs_rehash(&hash));

        let stronger = Argon2Scheme::new(&SecurityConfig {
            argon2_time_cost: 2,
            ..cheap_config()
        })
        .unwrap();
        assert!(stronger.needs_rehash(&hash));
        assert!(!stronger.needs_rehash("garbage"));
    }

    #[tokio::test]
    async fn test_verifier_rejects_unknown_user_and_wrong_password_alike() {
        let scheme = Arc::new(Argon2Scheme::new(&cheap_config()).unwrap());
        let verifier = CredentialVerifier::new(scheme.clone());
        let user = credentials(scheme.hash("Correct#Horse1").unwrap());

        assert!(verifier.verify(Some(&user), "Correct#Horse1").await);
        assert!(!verifier.verify(Some(&user), "nope").await);
        assert!(!verifier.verify(None, "nope").await);
        assert!(!verifier.verify(None, "Correct#Horse1").await);
    }

    struct CountingScheme {
        inner: Argon2Scheme,
        verified: std::sync::Mutex<Vec<String>>,
    }

    impl PasswordScheme for CountingScheme {
        fn hash(&self, password: &str) -> Result<String> {
            self.inner.hash(password)
        }

        fn verify(&self, password: &str, encoded_hash: &str) -> bool {
            self.verified.lock().unwrap().push(encoded_hash.to_string());
            self.inner.verify(password, encoded_hash)
        }

        fn needs_rehash(&self, encoded_hash: &str) -> bool {
            self.inner.needs_rehash(encoded_hash)
        }

        fn dummy_hash(&self) -> &str {
            self.inner.dummy_hash()
        }
    }

    #[tokio::test]
    async fn test_unknown_user_pays_one_full_verification() {
        let scheme = Arc::new(CountingScheme {
            inner: Argon2Scheme::new(&cheap_config()).unwrap(),
            verified: std::sync::Mutex::new(Vec::new()),
        });
        let verifier = CredentialVerifier::new(scheme.clone());

        assert!(!verifier.verify(None, "guess").await);

        let verified = scheme.verified.lock().unwrap().clone();
        assert_eq!(verified.len(), 1);
        assert_eq!(verified[0], scheme.dummy_hash());
        assert!(verified[0].starts_with("$argon2id$v=19$m=64,t=1,p=1$"));
    }

    #[tokio::test]
    async fn test_malformed_stored_hash_fails_closed() {
        let scheme = Arc::new(Argon2Scheme::new(&cheap_config()).unwrap());
        let verifier = CredentialVerifier::new(scheme);
        let user = credentials("plaintext-password".to_string());

        assert!(!verifier.verify(Some(&user), "plaintext-password").await);
    }
}
