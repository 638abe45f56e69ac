//! Per-account failed-login counting and temporary lockout.
//!
//! Expired locks are cleared lazily the next time an account is evaluated;
//! nothing sweeps the table in the background.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::LockoutConfig;
use crate::db::{self, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::from(&LockoutConfig::default())
    }
}

impl From<&LockoutConfig> for LockoutPolicy {
    fn from(config: &LockoutConfig) -> Self {
        Self {
            max_attempts: config.max_failed_attempts,
            window: Duration::minutes(i64::from(config.lockout_minutes)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    Locked { until: DateTime<Utc> },
}

impl LockStatus {
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// Result of counting one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The attempt was counted and the account is still open.
    Counted { failed_attempts: u32, remaining: u32 },
    /// The account is locked, either by this attempt or an earlier one.
    Locked { until: DateTime<Utc> },
}

/// Held for the duration of one login attempt against an account.
pub struct AttemptGuard {
    _slot: OwnedMutexGuard<()>,
}

pub struct LockoutTracker {
    store: Store,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    attempts: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
}

impl LockoutTracker {
    #[must_use]
    pub fn new(store: Store, policy: LockoutPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> LockoutPolicy {
        self.policy
    }

    /// Wait until no other attempt against `user_id` is in flight in this
    /// process.
    ///
    /// Attempts queued behind the one that locks the account find the lock at
    /// the gate and never reach password verification.
    pub async fn begin_attempt(&self, user_id: i32) -> AttemptGuard {
        let slot = {
            let mut slots = self.attempts.lock().await;
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(user_id).or_default().clone()
        };

        AttemptGuard {
            _slot: slot.lock_owned().await,
        }
    }

    /// Current lock state of an account.
    ///
    /// A lock whose `locked_until` has passed is cleared (and the failure
    /// counter reset) as a side effect. The clear is a compare-and-set on the
    /// observed timestamp, so a lock written concurrently is never erased.
    pub async fn status(&self, user_id: i32) -> Result<LockStatus> {
        let now = self.clock.now();

        db::retry_once("lockout_status", move || async move {
            let state = self
                .store
                .get_lockout_state(user_id)
                .await?
                .ok_or_else(|| anyhow!("User {user_id} not found"))?;

            match state.locked_until {
                Some(until) if until > now => Ok(LockStatus::Locked { until }),
                Some(until) => {
                    if self.store.clear_expired_lock(user_id, until).await? {
                        info!(user_id, "Account lock expired");
                    }
                    Ok(LockStatus::Unlocked)
                }
                None => Ok(LockStatus::Unlocked),
            }
        })
        .await
    }

    pub async fn is_locked(&self, user_id: i32) -> Result<bool> {
        Ok(self.status(user_id).await?.is_locked())
    }

    /// Count a failed attempt, locking the account when the threshold is hit.
    ///
    /// While locked the counter stays at the threshold and is not touched.
    pub async fn record_failure(&self, user_id: i32) -> Result<FailureOutcome> {
        if let LockStatus::Locked { until } = self.status(user_id).await? {
            return Ok(FailureOutcome::Locked { until });
        }

        let now = self.clock.now();
        let lock_until = now + self.policy.window;
        let max_attempts = i32::try_from(self.policy.max_attempts).unwrap_or(i32::MAX);

        let (state, locked_now) = db::retry_once("record_failed_login", move || async move {
            self.store
                .record_failed_login(user_id, now, max_attempts, lock_until)
                .await?
                .ok_or_else(|| anyhow!("User {user_id} not found"))
        })
        .await?;

        if locked_now {
            metrics::counter!("auth_lockouts_total").increment(1);
            warn!(
                user_id,
                attempts = state.failed_login_count,
                locked_until = %lock_until,
                "Account locked after repeated failed logins"
            );
        }

        let failed_attempts = u32::try_from(state.failed_login_count).unwrap_or_default();

        Ok(match state.locked_until {
            Some(until) if until > now => FailureOutcome::Locked { until },
            _ => FailureOutcome::Counted {
                failed_attempts,
                remaining: self.policy.max_attempts.saturating_sub(failed_attempts),
            },
        })
    }

    /// Unconditionally reset the counter and lock, stamping `last_login`.
    pub async fn record_success(&self, user_id: i32) -> Result<()> {
        let now = self.clock.now();

        let found = db::retry_once("record_successful_login", move || async move {
            self.store.reset_lockout(user_id, Some(now)).await
        })
        .await?;

        if !found {
            return Err(anyhow!("User {user_id} not found"));
        }

        Ok(())
    }

    /// Record a successful login unless a lock landed while the password was
    /// being checked.
    ///
    /// Unlike [`Self::record_success`] this never erases a lock that is still
    /// in force; it reports that lock instead and leaves every field alone.
    pub async fn complete_login(&self, user_id: i32) -> Result<LockStatus> {
        let now = self.clock.now();

        let state = db::retry_once("complete_login", move || async move {
            self.store
                .record_successful_login(user_id, now)
                .await?
                .ok_or_else(|| anyhow!("User {user_id} not found"))
        })
        .await?;

        Ok(match state.locked_until {
            Some(until) if until > now => LockStatus::Locked { until },
            _ => LockStatus::Unlocked,
        })
    }

    /// Administrative unlock. Returns false when the user does not exist.
    pub async fn unlock(&self, user_id: i32) -> Result<bool> {
        let found = db::retry_once("unlock_account", move || async move {
            self.store.reset_lockout(user_id, None).await
        })
        .await?;

        if found {
            info!(user_id, "Account unlocked by administrator");
        }

        Ok(found)
    }
}
