//! Login verification: PIN, single-use challenge, and voiceprint match.

use axum::{
    Json,
    extract::{Extension, Multipart},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::token::{SessionTokenClaims, sign_hs256};
use crate::voiceprint::{audio, crypto, embedding};

use super::audit::FailureReason;
use super::precheck::{self, FailureSurface, Precheck};
use super::state::AuthState;
use super::storage::{self, AccountRecord, ChallengeStatus, ConsumeOutcome};
use super::types::LoginResponse;
use super::utils::{extract_client_ip, valid_pin, valid_username};

struct LoginFields {
    username: String,
    pin: String,
    audio: Vec<u8>,
}

/// Pull the three expected fields out of the multipart body; unknown
/// fields are drained and ignored.
async fn read_login_form(multipart: &mut Multipart) -> Result<LoginFields, (StatusCode, String)> {
    let malformed = || {
        (
            StatusCode::BAD_REQUEST,
            "Malformed multipart payload".to_string(),
        )
    };

    let mut username = None;
    let mut pin = None;
    let mut audio = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| malformed())? {
        match field.name() {
            Some("username") => username = Some(field.text().await.map_err(|_| malformed())?),
            Some("pin") => pin = Some(field.text().await.map_err(|_| malformed())?),
            Some("audio" | "audio_file") => {
                audio = Some(field.bytes().await.map_err(|_| malformed())?.to_vec());
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    match (username, pin, audio) {
        (Some(username), Some(pin), Some(audio)) => Ok(LoginFields {
            username,
            pin,
            audio,
        }),
        (None, _, _) => Err((StatusCode::BAD_REQUEST, "Missing username".to_string())),
        (_, None, _) => Err((StatusCode::BAD_REQUEST, "Missing PIN".to_string())),
        (_, _, None) => Err((StatusCode::BAD_REQUEST, "Missing audio file".to_string())),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body(content = super::types::LoginForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 403, description = "Account locked", body = super::types::LockedResponse),
        (status = 500, description = "Authentication failed", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let fields = match read_login_form(&mut multipart).await {
        Ok(fields) => fields,
        Err((status, message)) => return (status, message).into_response(),
    };

    let username = fields.username.trim().to_string();
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }
    if !valid_pin(&fields.pin) {
        return (StatusCode::BAD_REQUEST, "Invalid PIN".to_string()).into_response();
    }

    let client_ip = extract_client_ip(&headers);

    // Step 1: PIN re-validation. The challenge endpoint already checked
    // it, but the credential may have changed in between and this
    // endpoint is callable on its own.
    let account = match precheck::run(&pool, &auth_state, &username, &fields.pin).await {
        Ok(Precheck::Ok(account)) => account,
        Ok(Precheck::UnknownUsername) => {
            return precheck::rejected(
                &pool,
                None,
                &username,
                FailureReason::UnknownUsername,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(Precheck::Disabled(account)) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                &username,
                FailureReason::AccountDisabled,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(Precheck::Locked { account, until }) => {
            if let Err(err) = storage::record_rejection(
                &pool,
                Some(account.id),
                &username,
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
            error!("Login pre-check failed: {err}");
            return server_error();
        }
    };

    // Step 2: the implicit challenge reference must still be answerable.
    match storage::peek_challenge(&pool, account.id).await {
        Ok(ChallengeStatus::Live) => {}
        Ok(ChallengeStatus::Missing) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                &username,
                FailureReason::ChallengeMissing,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(ChallengeStatus::Expired) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                &username,
                FailureReason::ChallengeExpired,
                client_ip.as_deref(),
            )
            .await;
        }
        Ok(ChallengeStatus::Reused) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                &username,
                FailureReason::ChallengeReused,
                client_ip.as_deref(),
            )
            .await;
        }
        Err(err) => {
            error!("Challenge lookup failed: {err}");
            return server_error();
        }
    }

    // Step 3: canonicalize the audio. Failures here do not burn the
    // challenge, so the caller can re-record against the same phrase.
    if fields.audio.len() > auth_state.config().max_audio_bytes() {
        return precheck::counted_failure(
            &pool,
            &auth_state,
            &account,
            FailureReason::AudioTooLarge,
            client_ip.as_deref(),
            &FailureSurface::Validation("Audio file too large"),
        )
        .await;
    }
    let samples = match audio::decode_wav(&fields.audio) {
        Ok(samples) => samples,
        Err(err) => {
            warn!("Audio decode failed for login: {err}");
            return precheck::counted_failure(
                &pool,
                &auth_state,
                &account,
                FailureReason::MalformedAudio,
                client_ip.as_deref(),
                &FailureSurface::Validation("Malformed audio"),
            )
            .await;
        }
    };

    // The audio decoded; this submission now consumes the challenge no
    // matter how verification ends. Exactly one racing submission wins.
    match storage::consume_challenge(&pool, account.id).await {
        Ok(ConsumeOutcome::Consumed) => {}
        Ok(ConsumeOutcome::Raced) => {
            return precheck::rejected(
                &pool,
                Some(account.id),
                &username,
                FailureReason::ChallengeReused,
                client_ip.as_deref(),
            )
            .await;
        }
        Err(err) => {
            error!("Challenge consume failed: {err}");
            return server_error();
        }
    }

    // Steps 4-5: extract the live embedding and score it against the
    // enrollment voiceprints. Neither holds any row lock.
    let live = match auth_state.encoder().embed(&samples).await {
        Ok(embedding) => embedding,
        Err(err) => {
            error!("Speaker encoder failed: {err}");
            return precheck::counted_failure(
                &pool,
                &auth_state,
                &account,
                FailureReason::EncoderError,
                client_ip.as_deref(),
                &FailureSurface::Credentials,
            )
            .await;
        }
    };

    let enrolled = match load_enrolled_embeddings(&pool, &auth_state, &account).await {
        Ok(enrolled) => enrolled,
        Err(err) => {
            error!("Failed to load enrollment voiceprints: {err}");
            if let Err(audit_err) = storage::record_rejection(
                &pool,
                Some(account.id),
                &username,
                FailureReason::Internal,
                client_ip.as_deref(),
            )
            .await
            {
                storage::log_audit_error("Failed to record internal error", &audit_err);
            }
            return server_error();
        }
    };

    let similarity = embedding::max_similarity(&live, &enrolled);
    if !similarity_accepted(similarity, auth_state.config().similarity_threshold()) {
        info!(
            username = %username,
            similarity,
            "voice similarity below threshold"
        );
        return precheck::counted_failure(
            &pool,
            &auth_state,
            &account,
            FailureReason::VoiceMismatch,
            client_ip.as_deref(),
            &FailureSurface::Credentials,
        )
        .await;
    }

    // Step 6: success. A failed bookkeeping write is logged but cannot
    // retract an authentication that already succeeded.
    if let Err(err) =
        storage::record_success(&pool, account.id, &username, client_ip.as_deref()).await
    {
        storage::log_audit_error("Failed to record login success", &err);
    }

    let claims = SessionTokenClaims::new(
        &account.username,
        &account.role,
        Utc::now().timestamp(),
        auth_state.config().token_ttl_seconds(),
    );
    let Some(expires_at) = DateTime::from_timestamp(claims.exp, 0) else {
        error!("Session expiry out of range: {}", claims.exp);
        return server_error();
    };
    match sign_hs256(auth_state.token_secret(), &claims) {
        Ok(token) => (
            StatusCode::OK,
            Json(LoginResponse {
                token,
                role: account.role,
                expires_at,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to sign session token: {err}");
            server_error()
        }
    }
}

async fn load_enrolled_embeddings(
    pool: &PgPool,
    state: &AuthState,
    account: &AccountRecord,
) -> anyhow::Result<Vec<Vec<f32>>> {
    let rows = storage::load_voiceprints(pool, account.id).await?;
    let mut enrolled = Vec::with_capacity(rows.len());
    for (voiceprint_id, ciphertext) in rows {
        let plaintext = crypto::decrypt_embedding(
            state.voiceprint_key(),
            &ciphertext,
            account.id,
            voiceprint_id,
        )?;
        enrolled.push(embedding::from_bytes(&plaintext)?);
    }
    Ok(enrolled)
}

/// ">=": equality at the threshold authenticates.
fn similarity_accepted(similarity: f32, threshold: f32) -> bool {
    similarity >= threshold
}

fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Authentication failed".to_string(),
    )
        .into_response()
}
