//! Input rules for profile setup.

use thiserror::Error;

use crate::constants::{PHONE_MIN_CHARS, USERNAME_MIN_CHARS};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Username must be at least {USERNAME_MIN_CHARS} characters")]
    UsernameTooShort,

    #[error("Username may only contain a-z, 0-9 and _")]
    UsernameInvalidChars,

    #[error("Please enter a valid phone number")]
    PhoneTooShort,
}

/// Lowercases the input and strips everything outside `[a-z0-9_]`, matching
/// what the setup form accepts keystroke by keystroke.
pub fn normalize_username(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username != normalize_username(username) {
        return Err(ValidationError::UsernameInvalidChars);
    }
    if username.len() < USERNAME_MIN_CHARS {
        return Err(ValidationError::UsernameTooShort);
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().len() < PHONE_MIN_CHARS {
        return Err(ValidationError::PhoneTooShort);
    }
    Ok(())
}

/// Every prefix of the username, shortest first. Stored on the profile so
/// the backend can serve prefix lookups without a full-text index.
pub fn search_keywords(username: &str) -> Vec<String> {
    username
        .char_indices()
        .map(|(i, c)| username[..i + c.len_utf8()].to_string())
        .collect()
}
