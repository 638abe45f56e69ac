//! Registration, profile updates, and administrator account management.

use std::sync::Arc;
use warden::SharedState;
use warden::clock::SystemClock;
use warden::config::Config;
use warden::services::{
    AdminUserUpdate, AuthError, Identity, IssueOnLogin, LoginRequest, NewUser, UserError,
};

async fn spawn() -> (SharedState, Identity) {
    let db_path =
        std::env::temp_dir().join(format!("warden-user-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.security.argon2_memory_cost_kib = 64;
    config.security.argon2_time_cost = 1;
    config.bootstrap.admin_password = Some("Adm1n!secret".to_string());

    let state = SharedState::with_clock(config, Arc::new(SystemClock))
        .await
        .expect("failed to create state");
    state
        .user_service
        .ensure_bootstrap_admin(&state.config.bootstrap)
        .await
        .expect("failed to bootstrap admin");

    let admin = identity(&state, "admin").await;
    (state, admin)
}

async fn identity(state: &SharedState, username: &str) -> Identity {
    let user = state
        .store
        .get_user_by_username(username)
        .await
        .unwrap()
        .unwrap();
    Identity::from(&user)
}

fn new_user(username: &str, email: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password: "Passw0rd!ok".to_string(),
    }
}

#[tokio::test]
async fn test_bootstrap_admin_is_idempotent() {
    let (state, admin) = spawn().await;
    assert!(admin.is_admin);

    let created = state
        .user_service
        .ensure_bootstrap_admin(&state.config.bootstrap)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(state.store.list_users().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_normalizes_and_rejects_duplicates() {
    let (state, _) = spawn().await;

    let profile = state
        .user_service
        .register(new_user(" alice ", "Alice@Example.COM"))
        .await
        .unwrap();
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.email, "alice@example.com");
    assert!(!profile.is_admin);
    assert!(profile.is_active);

    let err = state
        .user_service
        .register(new_user("alice", "other@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, UserError::Conflict(_)));

    let err = state
        .user_service
        .register(new_user("alice2", "ALICE@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, UserError::Conflict(_)));
}

#[tokio::test]
async fn test_register_validation() {
    let (state, _) = spawn().await;

    let cases = [
        new_user("ab", "ab@example.com"),
        new_user("bad name", "bad@example.com"),
        new_user("carol", "not-an-email"),
        NewUser {
            password: "alllowercase".to_string(),
            ..new_user("carol", "carol@example.com")
        },
    ];

    for case in cases {
        let username = case.username.clone();
        let err = state.user_service.register(case).await.unwrap_err();
        assert!(matches!(err, UserError::Validation(_)), "{username}: {err:?}");
    }
}

#[tokio::test]
async fn test_update_email() {
    let (state, _) = spawn().await;
    state
        .user_service
        .register(new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let alice = identity(&state, "alice").await;

    let profile = state
        .user_service
        .update_email(&alice, "New@Example.com")
        .await
        .unwrap();
    assert_eq!(profile.email, "new@example.com");

    // Keeping one's own address is not a conflict.
    state
        .user_service
        .update_email(&alice, "new@example.com")
        .await
        .unwrap();

    let err = state
        .user_service
        .update_email(&alice, "admin@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, UserError::Conflict(_)));
}

#[tokio::test]
async fn test_admin_operations_require_admin() {
    let (state, _) = spawn().await;
    state
        .user_service
        .register(new_user("alice", "alice@example.com"))
        .await
        .unwrap();
    let alice = identity(&state, "alice").await;

    assert!(matches!(
        state.user_service.list_users(&alice).await,
        Err(UserError::Forbidden(_))
    ));
    assert!(matches!(
        state.user_service.get_user(&alice, "admin").await,
        Err(UserError::Forbidden(_))
    ));
    assert!(matches!(
        state.user_service.delete_user(&alice, "admin").await,
        Err(UserError::Forbidden(_))
    ));
    assert!(matches!(
        state.user_service.unlock_user(&alice, "admin").await,
        Err(UserError::Forbidden(_))
    ));

    // A forged identity claiming admin is checked against storage.
    let forged = Identity {
        is_admin: true,
        ..alice
    };
    assert!(matches!(
        state
            .user_service
            .update_user(
                &forged,
                "alice",
                AdminUserUpdate {
                    is_admin: Some(true),
                    ..AdminUserUpdate::default()
                },
            )
            .await,
        Err(UserError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_admin_cannot_delete_or_demote_self() {
    let (state, admin) = spawn().await;

    assert!(matches!(
        state.user_service.delete_user(&admin, "admin").await,
        Err(UserError::Forbidden(_))
    ));
    assert!(matches!(
        state
            .user_service
            .update_user(
                &admin,
                "admin",
                AdminUserUpdate {
                    is_admin: Some(false),
                    ..AdminUserUpdate::default()
                },
            )
            .await,
        Err(UserError::Forbidden(_))
    ));
    assert!(matches!(
        state.user_service.get_user(&admin, "ghost").await,
        Err(UserError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_delete_user_removes_keys_and_sessions() {
    let (state, admin) = spawn().await;
    state
        .user_service
        .register(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let key = state
        .auth_service
        .login(
            LoginRequest::new("alice", "Passw0rd!ok").with_issue(IssueOnLogin::ApiKey {
                label: Some("laptop".to_string()),
            }),
        )
        .await
        .unwrap()
        .api_key
        .unwrap();
    let session = state
        .auth_service
        .login(
            LoginRequest::new("alice", "Passw0rd!ok")
                .with_issue(IssueOnLogin::Session { remember: false }),
        )
        .await
        .unwrap()
        .session
        .unwrap();

    state.user_service.delete_user(&admin, "alice").await.unwrap();

    assert!(matches!(
        state.auth_service.authenticate_api_key(&key.token).await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        state.auth_service.authenticate_session(&session.token).await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(state.store.get_user_by_username("alice").await.unwrap().is_none());
    assert!(matches!(
        state.user_service.delete_user(&admin, "alice").await,
        Err(UserError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_admin_unlock_restores_login() {
    let (state, admin) = spawn().await;
    state
        .user_service
        .register(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    for _ in 0..5 {
        let _ = state
            .auth_service
            .login(LoginRequest::new("alice", "wrong"))
            .await;
    }
    assert!(matches!(
        state
            .auth_service
            .login(LoginRequest::new("alice", "Passw0rd!ok"))
            .await,
        Err(AuthError::AccountLocked { .. })
    ));

    let profile = state.user_service.get_user(&admin, "alice").await.unwrap();
    assert_eq!(profile.failed_login_count, 5);
    assert!(profile.locked_until.is_some());

    state.user_service.unlock_user(&admin, "alice").await.unwrap();

    assert!(
        state
            .auth_service
            .login(LoginRequest::new("alice", "Passw0rd!ok"))
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_promoted_user_can_administer() {
    let (state, admin) = spawn().await;
    state
        .user_service
        .register(new_user("alice", "alice@example.com"))
        .await
        .unwrap();

    let profile = state
        .user_service
        .update_user(
            &admin,
            "alice",
            AdminUserUpdate {
                is_admin: Some(true),
                ..AdminUserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert!(profile.is_admin);

    let alice = identity(&state, "alice").await;
    let users = state.user_service.list_users(&alice).await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].username, "admin");
}
