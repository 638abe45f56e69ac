//! Login and token resolution command handlers

use chrono::Duration;

use super::support::read_secret;
use crate::services::{AuthError, IssueOnLogin, LoginRequest};
use crate::state::SharedState;

pub async fn cmd_login(
    state: &SharedState,
    identifier: &str,
    issue_key: Option<String>,
    session: bool,
    remember: bool,
    json: bool,
) -> anyhow::Result<()> {
    let password = read_secret("Password: ")?;

    let issue = match (issue_key, session) {
        (Some(label), _) => IssueOnLogin::ApiKey { label: Some(label) },
        (None, true) => IssueOnLogin::Session { remember },
        (None, false) => IssueOnLogin::Nothing,
    };

    match state
        .auth_service
        .login(LoginRequest::new(identifier, password).with_issue(issue))
        .await
    {
        Ok(success) if json => {
            println!("{}", serde_json::to_string_pretty(&success)?);
            Ok(())
        }
        Ok(success) => {
            println!("✓ Login allowed for {}", success.identity.username);
            if let Some(key) = success.api_key {
                println!("  API key {} ({}): {}", key.info.id, key.info.label, key.token);
            }
            if let Some(session) = success.session {
                println!("  Session (expires {}): {}", session.expires_at, session.token);
            }
            Ok(())
        }
        Err(err) => match err.reason() {
            Some(reason) => {
                println!("✗ Login rejected: {reason}");
                if let Some(wait) = err.retry_after(state.clock.now()) {
                    println!("  Retry in {} minute(s)", retry_minutes(wait));
                }
                Ok(())
            }
            None => Err(err.into()),
        },
    }
}

/// Whole minutes to wait, rounded up so a partial minute is never shown as 0.
fn retry_minutes(wait: Duration) -> i64 {
    (wait + Duration::seconds(59)).num_minutes()
}

pub async fn cmd_whoami(state: &SharedState, token: &str, session: bool) -> anyhow::Result<()> {
    let result = if session {
        state.auth_service.authenticate_session(token).await
    } else {
        state.auth_service.authenticate_api_key(token).await
    };

    match result {
        Ok(identity) => {
            let role = if identity.is_admin { "admin" } else { "user" };
            println!("{} (ID: {}, {role})", identity.username, identity.user_id);
            Ok(())
        }
        Err(AuthError::TokenInvalid) => {
            println!("✗ Token is invalid, revoked, or expired");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_minutes_rounds_up() {
        assert_eq!(retry_minutes(Duration::zero()), 0);
        assert_eq!(retry_minutes(Duration::seconds(1)), 1);
        assert_eq!(retry_minutes(Duration::seconds(60)), 1);
        assert_eq!(retry_minutes(Duration::seconds(61)), 2);
        assert_eq!(retry_minutes(Duration::minutes(30)), 30);
    }
}
