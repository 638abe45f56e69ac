//! API key command handlers

use super::support::identity_for;
use crate::state::SharedState;

pub async fn cmd_key_issue(
    state: &SharedState,
    username: &str,
    label: &str,
    expires_in_days: Option<u32>,
) -> anyhow::Result<()> {
    let identity = identity_for(state, username).await?;
    let issued = state
        .auth_service
        .issue_api_key(&identity, label, expires_in_days)
        .await?;

    println!("✓ Issued key {} ({})", issued.info.id, issued.info.label);
    if let Some(expires_at) = issued.info.expires_at {
        println!("  Expires: {expires_at}");
    }
    println!();
    println!("{}", issued.token);
    println!();
    println!("This token will not be shown again.");

    Ok(())
}

pub async fn cmd_key_list(state: &SharedState, username: &str, json: bool) -> anyhow::Result<()> {
    let identity = identity_for(state, username).await?;
    let keys = state.auth_service.list_api_keys(&identity).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }

    if keys.is_empty() {
        println!("No API keys for {username}.");
        return Ok(());
    }

    println!("API keys for {username} ({} total)", keys.len());
    println!("{:-<70}", "");
    for key in keys {
        let last_used = key
            .last_used
            .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
        println!("[{}] {} ({})", key.id, key.label, key.status.as_str());
        println!(
            "  Created: {} | Last used: {last_used}",
            key.created_at.to_rfc3339()
        );
    }

    Ok(())
}

pub async fn cmd_key_revoke(state: &SharedState, username: &str, key_id: i32) -> anyhow::Result<()> {
    let identity = identity_for(state, username).await?;
    state.auth_service.revoke_api_key(&identity, key_id).await?;
    println!("✓ Revoked key {key_id}");
    Ok(())
}
