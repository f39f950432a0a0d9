//! Shape rules for user-supplied identity fields.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static STARTS_WITH_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z]").expect("valid regex"));

static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^@]+@[^@]+\.[^@]+").expect("valid regex"));

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Username must begin with a letter")]
    UsernameStart,
    #[error("Username must be at least three characters long")]
    UsernameTooShort,
    #[error("Username must be 25 characters or less")]
    UsernameTooLong,
    #[error("Username cannot contain any space characters")]
    UsernameWhitespace,
    #[error("Email address is not valid")]
    Email,
}

/// Checks the username rules in order and reports the first one that fails.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !STARTS_WITH_LETTER.is_match(username) {
        return Err(ValidationError::UsernameStart);
    }
    let len = username.chars().count();
    if len < USERNAME_MIN_LEN {
        return Err(ValidationError::UsernameTooShort);
    }
    if len > USERNAME_MAX_LEN {
        return Err(ValidationError::UsernameTooLong);
    }
    if username.chars().any(char::is_whitespace) {
        return Err(ValidationError::UsernameWhitespace);
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if EMAIL_SHAPE.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::Email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_usernames() {
        assert_eq!(validate_username("john_daddy"), Ok(()));
        assert_eq!(validate_username("Abc"), Ok(()));
        assert_eq!(validate_username(&"a".repeat(25)), Ok(()));
    }

    #[test]
    fn reports_the_failing_rule() {
        assert_eq!(validate_username("1boat"), Err(ValidationError::UsernameStart));
        assert_eq!(validate_username("_boat"), Err(ValidationError::UsernameStart));
        assert_eq!(validate_username(""), Err(ValidationError::UsernameStart));
        assert_eq!(validate_username("ab"), Err(ValidationError::UsernameTooShort));
        assert_eq!(
            validate_username(&"a".repeat(26)),
            Err(ValidationError::UsernameTooLong)
        );
        assert_eq!(
            validate_username("boat daddy"),
            Err(ValidationError::UsernameWhitespace)
        );
        assert_eq!(
            validate_username("boat\tdaddy"),
            Err(ValidationError::UsernameWhitespace)
        );
    }

    #[test]
    fn messages_match_form_copy() {
        assert_eq!(
            ValidationError::UsernameTooShort.to_string(),
            "Username must be at least three characters long"
        );
    }

    #[test]
    fn email_needs_at_and_dot() {
        assert!(validate_email("john_daddy@boatdaddy.app").is_ok());
        assert_eq!(validate_email("john_daddy"), Err(ValidationError::Email));
        assert_eq!(validate_email("john@daddy"), Err(ValidationError::Email));
        assert_eq!(validate_email("@boatdaddy.app"), Err(ValidationError::Email));
    }
}
