//! Input validation for registration payloads
//!
//! The store only enforces uniqueness and `NOT NULL`; everything else about
//! a well-formed account is checked here, before any store call is made.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::NewUser;

/// Usernames are echoed back to clients and written to logs, so they stay
/// short and limited to `[A-Za-z0-9_]`
const USERNAME_LENGTH: RangeInclusive<usize> = 3..=32;

/// Longest address an SMTP path can carry (RFC 5321)
const EMAIL_MAX_LENGTH: usize = 254;

/// The upper bound caps how much input argon2 is asked to hash
const PASSWORD_LENGTH: RangeInclusive<usize> = 8..=128;

fn check_length(field: &str, value: &str, range: &RangeInclusive<usize>) -> Result<(), String> {
    let len = value.chars().count();
    if len < *range.start() {
        return Err(format!(
            "{} must be at least {} characters long",
            field,
            range.start()
        ));
    }
    if len > *range.end() {
        return Err(format!(
            "{} must be at most {} characters long",
            field,
            range.end()
        ));
    }
    Ok(())
}

/// Validate username
pub fn validate_username(username: &str) -> Result<(), String> {
    if username.is_empty() {
        return Err("Username is required".to_string());
    }
    check_length("Username", username, &USERNAME_LENGTH)?;

    static USERNAME: OnceLock<Regex> = OnceLock::new();
    let pattern = USERNAME
        .get_or_init(|| Regex::new(r"^\w+$").expect("Failed to compile username regex"));

    if !username.is_ascii() || !pattern.is_match(username) {
        return Err("Username can only contain letters, numbers, and underscores".to_string());
    }

    Ok(())
}

/// Validate email
///
/// A syntactic check only; the address is never contacted.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > EMAIL_MAX_LENGTH {
        return Err(format!(
            "Email must be at most {} characters long",
            EMAIL_MAX_LENGTH
        ));
    }

    static EMAIL: OnceLock<Regex> = OnceLock::new();
    let pattern = EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !pattern.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    check_length("Password", password, &PASSWORD_LENGTH)
}

/// Validate a full registration payload, first failure wins
pub fn validate_new_user(new_user: &NewUser) -> Result<(), String> {
    validate_username(&new_user.username)?;
    validate_email(&new_user.email)?;
    validate_password(&new_user.password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("john_doe").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
        assert!(validate_username("john doe").is_err());
        assert!(validate_username("jöhn_doe").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("john@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("john@").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("john@example..com").is_err());
        assert!(validate_email(&format!("{}@example.com", "a".repeat(250))).is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(129)).is_err());
    }

    #[test]
    fn test_first_failure_wins() {
        let new_user = NewUser {
            username: "x".to_string(),
            email: "broken".to_string(),
            password: "short".to_string(),
        };
        assert_eq!(
            validate_new_user(&new_user),
            Err("Username must be at least 3 characters long".to_string())
        );
    }
}
