//! Credential pre-check shared by the challenge issuer and the verifier.
//!
//! Order matters: lock state wins over PIN correctness (a locked account
//! never answers OK), and unknown usernames pay the same argon2 cost as
//! real ones so lookups are not distinguishable by timing.

use anyhow::Result;
use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use super::audit::FailureReason;
use super::state::AuthState;
use super::storage::{self, AccountRecord};
use super::types::LockedResponse;
use super::utils::verify_pin;

pub(super) enum Precheck {
    Ok(AccountRecord),
    UnknownUsername,
    PinMismatch(AccountRecord),
    Locked {
        account: AccountRecord,
        until: DateTime<Utc>,
    },
    Disabled(AccountRecord),
}

pub(super) async fn run(
    pool: &PgPool,
    state: &AuthState,
    username: &str,
    pin: &str,
) -> Result<Precheck> {
    let account = storage::lookup_account(pool, username).await?;
    let Some(account) = account else {
        // Burn the same verification cost as the real path.
        let _ = verify_pin(pin, state.dummy_pin_hash());
        return Ok(Precheck::UnknownUsername);
    };

    if !account.active {
        return Ok(Precheck::Disabled(account));
    }

    if let Some(until) = account.locked_until {
        if until > Utc::now() {
            return Ok(Precheck::Locked { account, until });
        }
        // The window has passed; the counter resets with it.
        storage::clear_expired_lock(pool, account.id).await?;
    }

    if verify_pin(pin, &account.pin_hash) {
        Ok(Precheck::Ok(account))
    } else {
        Ok(Precheck::PinMismatch(account))
    }
}

/// How a counted failure reads from the outside when it does not trip
/// the lock: the generic credentials message, or a verbatim validation
/// message for non-sensitive input problems (oversized/undecodable audio).
pub(super) enum FailureSurface {
    Credentials,
    Validation(&'static str),
}

/// 403 body shared by every locked-account response.
pub(super) fn locked_response(until: DateTime<Utc>) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(LockedResponse {
            error: "Account locked".to_string(),
            locked_until: until,
        }),
    )
        .into_response()
}

/// Record a counted failure and translate the updated counter state into
/// the externally visible response. A failed audit write is logged and
/// the caller's response is produced anyway.
pub(super) async fn counted_failure(
    pool: &PgPool,
    state: &AuthState,
    account: &AccountRecord,
    reason: FailureReason,
    client_ip: Option<&str>,
    surface: &FailureSurface,
) -> Response {
    debug_assert!(reason.counts_toward_lockout());
    match storage::record_attempt_failure(
        pool,
        account.id,
        &account.username,
        reason,
        client_ip,
        state.config().max_failed_attempts(),
        state.config().lockout_seconds(),
    )
    .await
    {
        Ok(update) => {
            if let Some(until) = update.locked_until {
                if until > Utc::now() {
                    // This attempt tripped (or extended into) the lock.
                    return locked_response(until);
                }
            }
        }
        Err(err) => {
            error!("Failed to record login failure: {err}");
        }
    }

    match surface {
        FailureSurface::Credentials => {
            (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
        }
        FailureSurface::Validation(message) => {
            (StatusCode::BAD_REQUEST, (*message).to_string()).into_response()
        }
    }
}

/// Audit-only rejection with the generic credentials response.
pub(super) async fn rejected(
    pool: &PgPool,
    account_id: Option<uuid::Uuid>,
    username: &str,
    reason: FailureReason,
    client_ip: Option<&str>,
) -> Response {
    debug_assert!(!reason.counts_toward_lockout());
    if let Err(err) = storage::record_rejection(pool, account_id, username, reason, client_ip).await
    {
        storage::log_audit_error("Failed to record rejected attempt", &err);
    }
    (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response()
}
