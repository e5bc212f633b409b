//! Field checks shared by the auth and admin handlers.

use validator::ValidateEmail;

use crate::error::{ApiError, FieldError};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters long";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";
pub const INVALID_EMAIL: &str = "Please provide a valid email address";

/// Accumulates field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<FieldError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: &str, msg: &str) {
        self.errors.push(FieldError::new(path, msg));
    }

    /// Records `msg` against `path` unless `ok` holds.
    pub fn check(&mut self, ok: bool, path: &str, msg: &str) {
        if !ok {
            self.push(path, msg);
        }
    }

    pub fn has(&self, path: &str) -> bool {
        self.errors.iter().any(|error| error.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    !email.is_empty() && email.validate_email()
}

/// 3–30 characters, none of them control characters.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len)
        && username.chars().all(|c| !c.is_control())
}

pub fn is_long_enough_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

/// Checks shared by every "set a new password" form.
pub fn check_new_password(
    errors: &mut FieldErrors,
    new_password: &str,
    confirm_password: &str,
) {
    errors.check(
        is_long_enough_password(new_password),
        "newPassword",
        PASSWORD_TOO_SHORT,
    );
    errors.check(
        confirm_password == new_password,
        "confirmPassword",
        PASSWORDS_DO_NOT_MATCH,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_boundary() {
        assert!(!is_long_enough_password("1234567"));
        assert!(is_long_enough_password("12345678"));
    }

    #[test]
    fn username_rules() {
        assert!(!is_valid_username("ab"));
        assert!(is_valid_username("abc"));
        assert!(is_valid_username(&"x".repeat(30)));
        assert!(!is_valid_username(&"x".repeat(31)));
        assert!(!is_valid_username("bad\nname"));
        assert!(is_valid_username("newModTest"));
    }

    #[test]
    fn email_is_normalized_and_checked() {
        let email = normalize_email("  TestUser@Example.COM ");
        assert_eq!(email, "testuser@example.com");
        assert!(is_valid_email(&email));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn collects_every_failure() {
        let mut errors = FieldErrors::new();
        check_new_password(&mut errors, "short", "different");
        assert!(errors.has("newPassword"));
        assert!(errors.has("confirmPassword"));
        match errors.into_result() {
            Err(ApiError::Validation(list)) => assert_eq!(list.len(), 2),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn empty_collection_is_ok() {
        let mut errors = FieldErrors::new();
        check_new_password(&mut errors, "longenough", "longenough");
        assert!(errors.is_empty());
        assert!(errors.into_result().is_ok());
    }
}
