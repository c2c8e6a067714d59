//! Credential format checks shared by registration and profile updates.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{config::PasswordConfig, errors::Error};

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern is a valid regex"));

/// Trimmed, lowercased email, or 400 "Invalid email format".
pub fn normalize_email(raw: &str) -> Result<String, Error> {
    let email = raw.trim().to_lowercase();
    if EMAIL.is_match(&email) {
        Ok(email)
    } else {
        Err(Error::bad_request("Invalid email format"))
    }
}

/// First failing rule wins: length, then an uppercase letter, a lowercase letter and a digit.
pub fn validate_password(password: &str, policy: &PasswordConfig) -> Result<(), Error> {
    let length = password.chars().count();
    if length < policy.min_length {
        return Err(Error::bad_request(format!(
            "Password must be at least {} characters long",
            policy.min_length
        )));
    }
    if length > policy.max_length {
        return Err(Error::bad_request(format!(
            "Password must be at most {} characters long",
            policy.max_length
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::bad_request("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(Error::bad_request("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(Error::bad_request("Password must contain at least one digit"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        for bad in ["alice", "alice@example", "@example.com", "a b@example.com", "alice@example.c"] {
            assert_eq!(normalize_email(bad).unwrap_err().user_message(), "Invalid email format", "{bad}");
        }
    }

    #[test]
    fn test_password_rules_in_order() {
        let policy = PasswordConfig::default();
        let cases = [
            ("Ab1", "Password must be at least 8 characters long"),
            ("lowercase1", "Password must contain at least one uppercase letter"),
            ("UPPERCASE1", "Password must contain at least one lowercase letter"),
            ("NoDigitsHere", "Password must contain at least one digit"),
        ];
        for (password, message) in cases {
            assert_eq!(validate_password(password, &policy).unwrap_err().user_message(), message);
        }
        assert!(validate_password("Password123", &policy).is_ok());

        let long = format!("Aa1{}", "x".repeat(200));
        assert_eq!(
            validate_password(&long, &policy).unwrap_err().user_message(),
            "Password must be at most 128 characters long"
        );
    }
}
