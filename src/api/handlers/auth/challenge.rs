//! Challenge issuing: credential pre-check, then a one-time spoken phrase.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use rand::{Rng, rngs::OsRng};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::audit::FailureReason;
use super::precheck::{self, FailureSurface, Precheck};
use super::state::AuthState;
use super::storage;
use super::types::{ChallengeRequest, ChallengeResponse};
use super::utils::{extract_client_ip, valid_pin, valid_username};

/// NATO words keep phrases phonetically distinct over low-quality
/// microphones; mixing in digit words makes pre-recorded replay harder
/// than a fixed passphrase would be.
const PHRASE_WORDS: [&str; 16] = [
    "ALPHA", "BRAVO", "CHARLIE", "DELTA", "ECHO", "FOXTROT", "GOLF", "HOTEL", "INDIA", "JULIETT",
    "KILO", "LIMA", "MIKE", "NOVEMBER", "OSCAR", "PAPA",
];

const PHRASE_DIGITS: [&str; 10] = [
    "ZERO", "ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN", "EIGHT", "NINER",
];

const PHRASE_PAIRS: usize = 3;

/// Build a speakable word/digit phrase like "ALPHA THREE BRAVO SEVEN".
pub(super) fn generate_phrase() -> String {
    let mut rng = OsRng;
    let mut parts = Vec::with_capacity(PHRASE_PAIRS * 2);
    for _ in 0..PHRASE_PAIRS {
        parts.push(PHRASE_WORDS[rng.gen_range(0..PHRASE_WORDS.len())]);
        parts.push(PHRASE_DIGITS[rng.gen_range(0..PHRASE_DIGITS.len())]);
    }
    parts.join(" ")
}

#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    request_body = ChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 403, description = "Account locked", body = super::types::LockedResponse)
    ),
    tag = "auth"
)]
pub async fn challenge(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChallengeRequest>>,
) -> impl IntoResponse {
    let request: ChallengeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    // Shape checks run before any storage access.
    let username = request.username.trim();
    if !valid_username(username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }
    if !valid_pin(&request.pin) {
        return (StatusCode::BAD_REQUEST, "Invalid PIN".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);

    let account = match precheck::run(&pool, &auth_state, username, &request.pin).await {
        Ok(Precheck::Ok(account)) => account,
        Ok(Precheck::UnknownUsername) => {
            return precheck::rejected(
                &pool,
                None,
                username,
                FailureReason::UnknownUsername,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(Precheck::Disabled(account)) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                username,
                FailureReason::AccountDisabled,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(Precheck::Locked { account, until }) => {
            if let Err(err) = storage::record_rejection(
                &pool,
                Some(account.id),
                username,
                FailureReason::AccountLocked,
                client_ip.as_deref(),
            )
            .await
            {
                storage::log_audit_error("Failed to record locked rejection", &err);
            }
            return precheck::locked_response(until);
        }
        Ok(Precheck::PinMismatch(account)) => {
            return precheck::counted_failure(
                &pool,
                &auth_state,
                &account,
                FailureReason::PinMismatch,
                client_ip.as_deref(),
                &FailureSurface::Credentials,
            )
            .await;
        }
        Err(err) => {
            error!("Challenge pre-check failed: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
                .into_response();
        }
    };

    let phrase = generate_phrase();
    match storage::issue_challenge(
        &pool,
        account.id,
        &phrase,
        auth_state.config().challenge_ttl_seconds(),
    )
    .await
    {
        Ok(expires_at) => (
            StatusCode::OK,
            Json(ChallengeResponse {
                challenge: phrase,
                expires_at,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to issue challenge: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
                .into_response()
        }
    }
}
