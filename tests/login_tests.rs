//! End-to-end login flows: lockout, disabled accounts, token minting, and
//! password changes.

use chrono::Duration;
use std::sync::Arc;
use warden::SharedState;
use warden::clock::{Clock, ManualClock};
use warden::config::Config;
use warden::services::{
    AdminUserUpdate, AuthError, Identity, IssueOnLogin, LoginRequest, NewUser,
};

const ADMIN_PASSWORD: &str = "Adm1n!secret";

fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("warden-login-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;
    config.security.argon2_parallelism = 1;
    config.bootstrap.admin_password = Some(ADMIN_PASSWORD.to_string());
    config
}

async fn spawn_with_config(config: Config) -> (SharedState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let state = SharedState::with_clock(config, clock.clone())
        .await
        .expect("failed to create state");

    let created = state
        .user_service
        .ensure_bootstrap_admin(&state.config.bootstrap)
        .await
        .expect("failed to bootstrap admin");
    assert!(created);

    (state, clock)
}

async fn spawn() -> (SharedState, Arc<ManualClock>) {
    spawn_with_config(test_config()).await
}

async fn admin_identity(state: &SharedState) -> Identity {
    let user = state
        .store
        .get_user_by_username("admin")
        .await
        .unwrap()
        .unwrap();
    Identity::from(&user)
}

async fn login(state: &SharedState, identifier: &str, password: &str) -> Result<Identity, AuthError> {
    state
        .auth_service
        .login(LoginRequest::new(identifier, password))
        .await
        .map(|success| success.identity)
}

#[tokio::test]
async fn test_admin_locked_out_after_five_wrong_passwords() {
    let (state, clock) = spawn().await;

    for attempt in 1..=4 {
        let err = login(&state, "admin", "wrong-password").await.unwrap_err();
        assert!(
            matches!(err, AuthError::InvalidCredentials),
            "attempt {attempt}: {err:?}"
        );
    }

    let err = login(&state, "admin", "wrong-password").await.unwrap_err();
    let AuthError::AccountLocked { until } = &err else {
        panic!("fifth failure should lock, got {err:?}");
    };
    assert_eq!(*until, clock.now() + Duration::minutes(30));
    assert_eq!(err_reason(&state, "admin", "wrong-password").await, "locked");

    // Correct password while locked is still rejected.
    let err = login(&state, "admin", ADMIN_PASSWORD).await.unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked { .. }));
    assert_eq!(
        err.retry_after(clock.now()),
        Some(Duration::minutes(30))
    );

    let user = state.store.get_user_by_username("admin").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 5);
    assert_eq!(user.last_login, None);
}

async fn err_reason(state: &SharedState, identifier: &str, password: &str) -> &'static str {
    login(state, identifier, password)
        .await
        .unwrap_err()
        .reason()
        .unwrap()
}

#[tokio::test]
async fn test_lock_expires_and_correct_password_resets_counter() {
    let (state, clock) = spawn().await;

    for _ in 0..5 {
        let _ = login(&state, "admin", "wrong-password").await;
    }

    clock.advance(Duration::minutes(31));
    let identity = login(&state, "admin", ADMIN_PASSWORD).await.unwrap();
    assert_eq!(identity.username, "admin");
    assert!(identity.is_admin);

    let user = state.store.get_user_by_username("admin").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 0);
    assert_eq!(user.locked_until, None);
    assert_eq!(user.last_login, Some(clock.now()));
}

#[tokio::test]
async fn test_success_resets_partial_failure_count() {
    let (state, _) = spawn().await;

    for _ in 0..4 {
        let _ = login(&state, "admin", "wrong-password").await;
    }
    login(&state, "admin", ADMIN_PASSWORD).await.unwrap();

    // Four more failures are needed again before a lock.
    for _ in 0..4 {
        let err = login(&state, "admin", "wrong-password").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}

#[tokio::test]
async fn test_unknown_user_is_indistinguishable_from_wrong_password() {
    let (state, _) = spawn().await;

    assert_eq!(
        err_reason(&state, "nobody", "whatever").await,
        "bad_credentials"
    );
    assert_eq!(
        err_reason(&state, "admin", "whatever").await,
        "bad_credentials"
    );
    assert_eq!(err_reason(&state, "", "").await, "bad_credentials");
}

#[tokio::test]
async fn test_login_by_email_is_case_insensitive() {
    let (state, _) = spawn().await;

    let identity = login(&state, "Admin@Example.com", ADMIN_PASSWORD)
        .await
        .unwrap();
    assert_eq!(identity.username, "admin");
}

#[tokio::test]
async fn test_disabled_account_keeps_counters() {
    let (state, _) = spawn().await;
    let admin = admin_identity(&state).await;

    state
        .user_service
        .register(NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Alic3!password".to_string(),
        })
        .await
        .unwrap();

    let _ = login(&state, "alice", "wrong-password").await;
    let _ = login(&state, "alice", "wrong-password").await;

    state
        .user_service
        .update_user(
            &admin,
            "alice",
            AdminUserUpdate {
                is_active: Some(false),
                ..AdminUserUpdate::default()
            },
        )
        .await
        .unwrap();

    let err = login(&state, "alice", "Alic3!password").await.unwrap_err();
    assert!(matches!(err, AuthError::AccountDisabled));
    assert_eq!(err.reason(), Some("disabled"));

    let user = state.store.get_user_by_username("alice").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 2);
    assert_eq!(user.last_login, None);
}

#[tokio::test]
async fn test_login_can_mint_api_key() {
    let (state, _) = spawn().await;

    let success = state
        .auth_service
        .login(
            LoginRequest::new("admin", ADMIN_PASSWORD)
                .with_issue(IssueOnLogin::ApiKey { label: None }),
        )
        .await
        .unwrap();

    let key = success.api_key.expect("api key requested");
    assert_eq!(key.info.label, "login");
    assert!(success.session.is_none());

    let identity = state
        .auth_service
        .authenticate_api_key(&key.token)
        .await
        .unwrap();
    assert_eq!(identity, success.identity);
}

#[tokio::test]
async fn test_login_key_label_is_validated_before_password_check() {
    let (state, _) = spawn().await;

    let err = state
        .auth_service
        .login(
            LoginRequest::new("admin", "wrong-password").with_issue(IssueOnLogin::ApiKey {
                label: Some("   ".to_string()),
            }),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(_)));

    let user = state.store.get_user_by_username("admin").await.unwrap().unwrap();
    assert_eq!(user.failed_login_count, 0);
}

#[tokio::test]
async fn test_session_login_and_logout() {
    let (state, clock) = spawn().await;

    let success = state
        .auth_service
        .login(
            LoginRequest::new("admin", ADMIN_PASSWORD)
                .with_issue(IssueOnLogin::Session { remember: false }),
        )
        .await
        .unwrap();
    let session = success.session.expect("session requested");
    assert_eq!(session.expires_at, clock.now() + Duration::minutes(60));

    let identity = state
        .auth_service
        .authenticate_session(&session.token)
        .await
        .unwrap();
    assert_eq!(identity.username, "admin");

    state.auth_service.logout(&session.token).await.unwrap();
    let err = state
        .auth_service
        .authenticate_session(&session.token)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenInvalid));

    // Logging out twice is harmless.
    state.auth_service.logout(&session.token).await.unwrap();
}

#[tokio::test]
async fn test_change_password_rules_and_session_revocation() {
    let (state, _) = spawn().await;
    let admin = admin_identity(&state).await;

    let session = state
        .auth_service
        .login(
            LoginRequest::new("admin", ADMIN_PASSWORD)
                .with_issue(IssueOnLogin::Session { remember: true }),
        )
        .await
        .unwrap()
        .session
        .unwrap();

    let err = state
        .auth_service
        .change_password(&admin, "not-current", "N3w!password")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(ref m) if m.contains("incorrect")));

    let err = state
        .auth_service
        .change_password(&admin, ADMIN_PASSWORD, ADMIN_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(ref m) if m.contains("different")));

    let err = state
        .auth_service
        .change_password(&admin, ADMIN_PASSWORD, "weak")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Validation(ref m) if m.contains("at least")));

    state
        .auth_service
        .change_password(&admin, ADMIN_PASSWORD, "N3w!password")
        .await
        .unwrap();

    assert!(matches!(
        state.auth_service.authenticate_session(&session.token).await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(login(&state, "admin", ADMIN_PASSWORD).await.is_err());
    assert!(login(&state, "admin", "N3w!password").await.is_ok());
}

#[tokio::test]
async fn test_outdated_hash_is_migrated_on_login() {
    let config = test_config();
    let (state, clock) = spawn_with_config(config.clone()).await;

    let mut stronger = config;
    stronger.security.argon2_time_cost = 2;
    let upgraded = SharedState::from_store(stronger, state.store.clone(), clock)
        .await
        .unwrap();

    let before = state.store.get_user_credentials(1).await.unwrap().unwrap();
    assert!(before.password_hash.contains("t=1"));

    login(&upgraded, "admin", ADMIN_PASSWORD).await.unwrap();

    let after = state.store.get_user_credentials(1).await.unwrap().unwrap();
    assert!(after.password_hash.contains("t=2"));
    assert!(login(&upgraded, "admin", ADMIN_PASSWORD).await.is_ok());
}
