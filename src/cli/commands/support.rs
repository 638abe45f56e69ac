use anyhow::{Context, Result, anyhow};
use std::io::Write;

use crate::services::Identity;
use crate::state::SharedState;

/// Read one line from stdin without echoing a prompt to stdout.
pub fn read_secret(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;

    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

/// The local operator acts as the named account.
pub async fn identity_for(state: &SharedState, username: &str) -> Result<Identity> {
    let user = state
        .store
        .get_user_by_username(username)
        .await?
        .ok_or_else(|| anyhow!("User not found: {username}"))?;

    Ok(Identity::from(&user))
}

pub async fn admin_identity(state: &SharedState, actor: Option<&str>) -> Result<Identity> {
    let username = actor.unwrap_or(&state.config.bootstrap.admin_username);
    identity_for(state, username).await
}
