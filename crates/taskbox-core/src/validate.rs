//! Input validation for registration and task fields.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ServiceError};

pub const USERNAME_MIN: usize = 5;
pub const USERNAME_MAX: usize = 30;
pub const PASSWORD_MIN: usize = taskbox_auth::MIN_PASSWORD_LEN;
pub const TITLE_MIN: usize = 4;

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^[A-Za-z0-9]{{{USERNAME_MIN},{USERNAME_MAX}}}$"))
        .expect("username pattern is valid")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

/// 5 to 30 ASCII letters and digits.
pub fn username(value: &str) -> Result<()> {
    if USERNAME_RE.is_match(value) {
        return Ok(());
    }
    Err(ServiceError::invalid(
        "username",
        format!("must be {USERNAME_MIN} to {USERNAME_MAX} letters or digits"),
    ))
}

pub fn password(value: &str) -> Result<()> {
    if value.chars().count() >= PASSWORD_MIN {
        return Ok(());
    }
    Err(ServiceError::invalid(
        "password",
        format!("must be at least {PASSWORD_MIN} characters"),
    ))
}

pub fn email(value: &str) -> Result<()> {
    if EMAIL_RE.is_match(value) {
        return Ok(());
    }
    Err(ServiceError::invalid("email", "is not a valid address"))
}

/// At least 4 characters, whitespace included.
pub fn title(value: &str) -> Result<()> {
    if value.chars().count() >= TITLE_MIN {
        return Ok(());
    }
    Err(ServiceError::invalid(
        "title",
        format!("must be at least {TITLE_MIN} characters"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        for ok in ["alice", "Bob12", "a2345678901234567890123456789z"] {
            username(ok).unwrap();
        }
        for bad in ["", "abcd", "alice!", "al ice", "ålice", "a".repeat(31).as_str()] {
            assert!(username(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn passwords() {
        password("12345").unwrap();
        assert!(password("1234").is_err());
    }

    #[test]
    fn emails() {
        for ok in ["alice@example.com", "a.b+tag@mail.example.org"] {
            email(ok).unwrap();
        }
        for bad in ["", "alice", "alice@", "@example.com", "alice@example", "a b@example.com"] {
            assert!(email(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn titles() {
        title("Milk").unwrap();
        assert!(title("Mil").is_err());
        assert!(title("").is_err());
        // Whitespace counts.
        title("  ab").unwrap();
        title("    ").unwrap();
    }

    #[test]
    fn errors_name_the_field() {
        let err = email("nope").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput { field: "email", .. }));
    }
}
