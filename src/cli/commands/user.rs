//! User account command handlers

use super::support::{admin_identity, identity_for, read_secret};
use crate::services::{AdminUserUpdate, NewUser, UserProfile};
use crate::state::SharedState;

fn print_profile(user: &UserProfile) {
    let role = if user.is_admin { "admin" } else { "user" };
    let status = if user.is_active { "active" } else { "disabled" };
    println!("{} <{}> [{role}, {status}]", user.username, user.email);
    println!("  ID: {} | Created: {}", user.id, user.created_at);
}

pub async fn cmd_user_add(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
    email: &str,
    admin: bool,
) -> anyhow::Result<()> {
    let password = read_secret("Password: ")?;

    let user = state
        .user_service
        .register(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password,
        })
        .await?;

    if admin {
        let actor = admin_identity(state, actor).await?;
        state
            .user_service
            .update_user(
                &actor,
                &user.username,
                AdminUserUpdate {
                    is_admin: Some(true),
                    ..AdminUserUpdate::default()
                },
            )
            .await?;
    }

    println!("✓ Created user {} (ID: {})", user.username, user.id);
    Ok(())
}

pub async fn cmd_user_list(
    state: &SharedState,
    actor: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;
    let users = state.user_service.list_users(&actor).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }

    println!("Users ({} total)", users.len());
    println!("{:-<70}", "");
    for user in &users {
        print_profile(user);
    }

    Ok(())
}

pub async fn cmd_user_show(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
    json: bool,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;
    let user = state.user_service.get_user(&actor, username).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    print_profile(&user);
    println!("  Failed logins: {}", user.failed_login_count);
    match &user.locked_until {
        Some(until) => println!("  Locked until: {until}"),
        None => println!("  Locked: no"),
    }
    println!(
        "  Last login: {}",
        user.last_login.as_deref().unwrap_or("never")
    );

    Ok(())
}

pub async fn cmd_user_delete(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;

    println!("Delete user '{username}' together with all of its API keys and sessions?");
    println!("Enter 'y' to confirm, anything else to cancel:");

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim().eq_ignore_ascii_case("y") {
        state.user_service.delete_user(&actor, username).await?;
        println!("✓ Deleted: {username}");
    } else {
        println!("Cancelled.");
    }

    Ok(())
}

pub async fn cmd_user_unlock(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;
    state.user_service.unlock_user(&actor, username).await?;
    println!("✓ Unlocked: {username}");
    Ok(())
}

pub async fn cmd_user_set_active(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
    active: bool,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;
    let user = state
        .user_service
        .update_user(
            &actor,
            username,
            AdminUserUpdate {
                is_active: Some(active),
                ..AdminUserUpdate::default()
            },
        )
        .await?;

    print_profile(&user);
    Ok(())
}

pub async fn cmd_user_set_admin(
    state: &SharedState,
    actor: Option<&str>,
    username: &str,
    admin: bool,
) -> anyhow::Result<()> {
    let actor = admin_identity(state, actor).await?;
    let user = state
        .user_service
        .update_user(
            &actor,
            username,
            AdminUserUpdate {
                is_admin: Some(admin),
                ..AdminUserUpdate::default()
            },
        )
        .await?;

    print_profile(&user);
    Ok(())
}

pub async fn cmd_user_passwd(state: &SharedState, username: &str) -> anyhow::Result<()> {
    let identity = identity_for(state, username).await?;
    let current = read_secret("Current password: ")?;
    let new_password = read_secret("New password: ")?;

    state
        .auth_service
        .change_password(&identity, &current, &new_password)
        .await?;

    println!("✓ Password changed; all sessions for {username} were ended.");
    Ok(())
}
