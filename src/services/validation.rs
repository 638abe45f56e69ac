use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::config::PasswordPolicyConfig;
use crate::constants::limits::{
    EMAIL_MAX_LEN, KEY_LABEL_MAX_LEN, PASSWORD_SPECIAL_CHARS, USERNAME_MAX_LEN, USERNAME_MIN_LEN,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

static USERNAME_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").ok());

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

pub fn validate_username(username: &str) -> Result<&str, ValidationError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("Username is required"));
    }

    let len = trimmed.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::new(format!(
            "Username must be between {USERNAME_MIN_LEN} and {USERNAME_MAX_LEN} characters"
        )));
    }

    if !USERNAME_RE.as_ref().is_some_and(|re| re.is_match(trimmed)) {
        return Err(ValidationError::new(
            "Username can only contain letters, numbers, underscores, and hyphens",
        ));
    }

    Ok(trimmed)
}

/// Validate an email address and return its normalized (lower-cased) form.
pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let normalized = email.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(ValidationError::new("Email is required"));
    }

    if normalized.chars().count() > EMAIL_MAX_LEN {
        return Err(ValidationError::new(format!(
            "Email must be less than {EMAIL_MAX_LEN} characters"
        )));
    }

    if !EMAIL_RE.as_ref().is_some_and(|re| re.is_match(&normalized)) {
        return Err(ValidationError::new("Please enter a valid email address"));
    }

    Ok(normalized)
}

/// Check a new password against the configured strength policy.
///
/// All unmet requirements are reported in one message.
pub fn validate_password(
    password: &str,
    policy: &PasswordPolicyConfig,
) -> Result<(), ValidationError> {
    let mut missing = Vec::new();

    if password.chars().count() < policy.min_length {
        missing.push(format!("at least {} characters", policy.min_length));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("at least one uppercase letter".to_string());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("at least one lowercase letter".to_string());
    }
    if policy.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("at least one digit".to_string());
    }
    if policy.require_special && !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        missing.push("at least one special character".to_string());
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(format!(
            "Password must contain {}.",
            missing.join(", ")
        )))
    }
}

pub fn validate_key_label(label: &str) -> Result<&str, ValidationError> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("API key name is required"));
    }

    if trimmed.chars().count() > KEY_LABEL_MAX_LEN {
        return Err(ValidationError::new(format!(
            "API key name must be {KEY_LABEL_MAX_LEN} characters or less"
        )));
    }

    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username("admin").unwrap(), "admin");
        assert_eq!(validate_username("  jane_doe-1 ").unwrap(), "jane_doe-1");
        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(81)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("bad@name").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email(" Jane@Example.COM ").unwrap(),
            "jane@example.com"
        );
        assert!(normalize_email("").is_err());
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email(&format!("{}@example.com", "a".repeat(120))).is_err());
    }

    #[test]
    fn test_validate_password_lists_every_missing_rule() {
        let policy = PasswordPolicyConfig::default();
        assert!(validate_password("Str0ng!pass", &policy).is_ok());

        let err = validate_password("weak", &policy).unwrap_err();
        assert!(err.0.contains("at least 8 characters"));
        assert!(err.0.contains("uppercase"));
        assert!(err.0.contains("digit"));
        assert!(err.0.contains("special"));
        assert!(!err.0.contains("lowercase"));
    }

    #[test]
    fn test_validate_password_respects_relaxed_policy() {
        let policy = PasswordPolicyConfig {
            min_length: 4,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
            require_special: false,
        };
        assert!(validate_password("abcd", &policy).is_ok());
        assert!(validate_password("abc", &policy).is_err());
    }

    #[test]
    fn test_validate_key_label() {
        assert_eq!(validate_key_label(" laptop ").unwrap(), "laptop");
        assert!(validate_key_label("   ").is_err());
        assert!(validate_key_label(&"k".repeat(101)).is_err());
    }
}
