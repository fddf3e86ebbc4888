//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeRequest {
    pub username: String,
    pub pin: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    /// Phrase the caller must speak in the recorded login sample.
    pub challenge: String,
    pub expires_at: DateTime<Utc>,
}

/// Multipart form consumed by `/v1/auth/login`.
#[derive(ToSchema, Debug)]
#[allow(dead_code)] // schema-only: the handler reads multipart fields directly
pub struct LoginForm {
    pub username: String,
    pub pin: String,
    /// WAV recording of the spoken challenge phrase.
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    /// Bearer token for subsequent protected requests.
    pub token: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

/// Multipart form consumed by `/v1/auth/enroll`; `audio` may repeat.
#[derive(ToSchema, Debug)]
#[allow(dead_code)] // schema-only: the handler reads multipart fields directly
pub struct EnrollForm {
    pub username: String,
    pub pin: String,
    /// One or more WAV enrollment samples.
    #[schema(value_type = String, format = Binary)]
    pub audio: Vec<u8>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnrollResponse {
    pub username: String,
    /// Number of enrollment samples accepted.
    pub samples: usize,
}

/// 403 body for locked accounts: the lock expiry is deliberately
/// machine-parsable so clients can render a countdown.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LockedResponse {
    pub error: String,
    pub locked_until: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub username: String,
    pub role: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use chrono::TimeZone;

    #[test]
    fn challenge_request_round_trips() -> Result<()> {
        let request = ChallengeRequest {
            username: "alice".to_string(),
            pin: "1234".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let username = value
            .get("username")
            .and_then(serde_json::Value::as_str)
            .context("missing username")?;
        assert_eq!(username, "alice");
        let decoded: ChallengeRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.pin, "1234");
        Ok(())
    }

    #[test]
    fn locked_response_serializes_rfc3339_expiry() -> Result<()> {
        let locked_until = Utc
            .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
            .single()
            .context("valid timestamp")?;
        let response = LockedResponse {
            error: "Account locked".to_string(),
            locked_until,
        };
        let value = serde_json::to_value(&response)?;
        let rendered = value
            .get("locked_until")
            .and_then(serde_json::Value::as_str)
            .context("missing locked_until")?;
        assert!(rendered.starts_with("2026-01-02T03:04:05"));
        Ok(())
    }
}
