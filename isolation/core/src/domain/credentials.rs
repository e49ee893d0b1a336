// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Credential rules applied at registration, and the hashing seam.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

const SPECIAL_CHARACTERS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Every complexity rule the password breaks, in a fixed order.
pub fn password_violations(password: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must contain at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        errors.push("Password must contain at least one special character");
    }

    errors
}

/// `None` when the password is acceptable, otherwise all violations joined by ". ".
pub fn password_error_message(password: &str) -> Option<String> {
    let violations = password_violations(password);
    if violations.is_empty() {
        None
    } else {
        Some(violations.join(". "))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Credential hashing failed: {0}")]
pub struct CredentialError(pub String);

/// One-way password hashing.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    fn verify(&self, password: &str, hash: &str) -> Result<bool, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example@x.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn test_strong_password_passes() {
        assert!(password_violations("Sup3r$ecret").is_empty());
        assert_eq!(password_error_message("Sup3r$ecret"), None);
    }

    #[test]
    fn test_weak_password_reports_every_violation() {
        let message = password_error_message("abc").unwrap();
        assert_eq!(
            message,
            "Password must be at least 8 characters long. \
             Password must contain at least one uppercase letter. \
             Password must contain at least one number. \
             Password must contain at least one special character"
        );
    }

    #[test]
    fn test_single_violation() {
        assert_eq!(
            password_violations("Password1"),
            vec!["Password must contain at least one special character"]
        );
    }
}
