//! Small helpers for credential validation and PIN hashing.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use regex::Regex;

/// Username shape: 3-50 characters, alphanumeric plus underscore.
/// Checked before any storage lookup so malformed input never reaches SQL.
pub(super) fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]{3,50}$").is_ok_and(|regex| regex.is_match(username))
}

/// PIN shape: 4-8 ASCII digits.
pub(super) fn valid_pin(pin: &str) -> bool {
    Regex::new(r"^[0-9]{4,8}$").is_ok_and(|regex| regex.is_match(pin))
}

/// Hash a PIN for storage as an argon2id PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub(crate) fn hash_pin(pin: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(pin.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash PIN: {e}"))
}

/// Verify a PIN against a stored PHC string.
///
/// The comparison inside argon2 is constant-time; an unparseable stored
/// hash counts as a mismatch rather than an error so the caller's control
/// flow stays uniform.
pub(super) fn verify_pin(pin: &str, pin_hash: &str) -> bool {
    PasswordHash::new(pin_hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Extract a client IP for audit records from common proxy headers.
pub(super) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[test]
    fn valid_username_accepts_allowed_charset() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice_2"));
        assert!(valid_username("A_1"));
    }

    #[test]
    fn valid_username_rejects_bad_shapes() {
        assert!(!valid_username("al"));
        assert!(!valid_username(&"a".repeat(51)));
        assert!(!valid_username("alice!"));
        assert!(!valid_username("alice bob"));
        assert!(!valid_username(""));
    }

    #[test]
    fn valid_pin_accepts_digit_runs() {
        assert!(valid_pin("1234"));
        assert!(valid_pin("12345678"));
    }

    #[test]
    fn valid_pin_rejects_bad_shapes() {
        assert!(!valid_pin("123"));
        assert!(!valid_pin("123456789"));
        assert!(!valid_pin("12a4"));
        assert!(!valid_pin(""));
    }

    #[test]
    fn pin_hash_round_trip() -> anyhow::Result<()> {
        let hash = hash_pin("1234")?;
        assert!(hash.starts_with("$argon2"));
        assert!(verify_pin("1234", &hash));
        assert!(!verify_pin("4321", &hash));
        Ok(())
    }

    #[test]
    fn verify_pin_tolerates_garbage_hash() {
        assert!(!verify_pin("1234", "not-a-phc-string"));
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        let headers = HeaderMap::new();
        assert_eq!(extract_client_ip(&headers), None);
    }

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
