//! Client-side input validation.
//!
//! Everything here runs before a request is built. A validation failure
//! blocks the action and no network call is made.

use thiserror::Error;

/// Minimum username length after trimming.
pub const MIN_USERNAME_LEN: usize = 3;

/// Minimum password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Malformed user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Login form submitted with an empty field.
    #[error("username and password are required")]
    MissingCredentials,

    /// Username shorter than the minimum.
    #[error("username must be at least {min} characters")]
    UsernameTooShort {
        /// Required minimum.
        min: usize,
    },

    /// Password shorter than the minimum.
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Required minimum.
        min: usize,
    },

    /// Email was supplied but is not an address.
    #[error("malformed email address: {0}")]
    MalformedEmail(String),

    /// Message body is empty after trimming.
    #[error("message is empty")]
    EmptyContent,

    /// Message body exceeds the limit.
    #[error("message is {len} characters, limit is {max}")]
    ContentTooLong {
        /// Length of the rejected body in characters.
        len: usize,
        /// Allowed maximum.
        max: usize,
    },
}

/// Check login form fields. Returns the trimmed username.
pub fn login_fields(username: &str, password: &str) -> Result<String, ValidationError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok(username.to_string())
}

/// Check a username for registration. Returns it trimmed.
pub fn username(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.chars().count() < MIN_USERNAME_LEN {
        return Err(ValidationError::UsernameTooShort {
            min: MIN_USERNAME_LEN,
        });
    }
    Ok(name.to_string())
}

/// Check a password for registration.
pub fn password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Check an optional email. Blank input means "not supplied".
pub fn email(email: Option<&str>) -> Result<Option<String>, ValidationError> {
    let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let malformed = || ValidationError::MalformedEmail(email.to_string());
    if email.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    let (local, domain) = email.split_once('@').ok_or_else(malformed)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || domain.contains("..")
    {
        return Err(malformed());
    }
    Ok(Some(email.to_string()))
}

/// Check a message body. Returns it trimmed.
///
/// Length is counted in characters, not bytes.
pub fn content(body: &str, max: usize) -> Result<String, ValidationError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    let len = body.chars().count();
    if len > max {
        return Err(ValidationError::ContentTooLong { len, max });
    }
    Ok(body.to_string())
}
