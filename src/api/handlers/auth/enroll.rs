//! Account enrollment: PIN hash plus one or more encrypted voiceprints.

use axum::{
    Json,
    extract::{Extension, Multipart},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::voiceprint::{audio, crypto, embedding};

use super::state::AuthState;
use super::storage::{self, EnrollOutcome};
use super::types::EnrollResponse;
use super::utils::{hash_pin, valid_pin, valid_username};

struct EnrollFields {
    username: String,
    pin: String,
    samples: Vec<Vec<u8>>,
}

async fn read_enroll_form(multipart: &mut Multipart) -> Result<EnrollFields, (StatusCode, String)> {
    let malformed = || {
        (
            StatusCode::BAD_REQUEST,
            "Malformed multipart payload".to_string(),
        )
    };

    let mut username = None;
    let mut pin = None;
    let mut samples = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|_| malformed())? {
        match field.name() {
            Some("username") => username = Some(field.text().await.map_err(|_| malformed())?),
            Some("pin") => pin = Some(field.text().await.map_err(|_| malformed())?),
            Some("audio" | "audio_file") => {
                samples.push(field.bytes().await.map_err(|_| malformed())?.to_vec());
            }
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    let Some(username) = username else {
        return Err((StatusCode::BAD_REQUEST, "Missing username".to_string()));
    };
    let Some(pin) = pin else {
        return Err((StatusCode::BAD_REQUEST, "Missing PIN".to_string()));
    };
    if samples.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Missing enrollment audio".to_string(),
        ));
    }

    Ok(EnrollFields {
        username,
        pin,
        samples,
    })
}

#[utoipa::path(
    post,
    path = "/v1/auth/enroll",
    request_body(content = super::types::EnrollForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Account enrolled", body = EnrollResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 409, description = "Username already taken", body = String),
        (status = 500, description = "Enrollment failed", body = String)
    ),
    tag = "auth"
)]
pub async fn enroll(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let fields = match read_enroll_form(&mut multipart).await {
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
    if fields.samples.len() > auth_state.config().max_enroll_samples() {
        return (
            StatusCode::BAD_REQUEST,
            "Too many enrollment samples".to_string(),
        )
            .into_response();
    }

    // Decode and embed every sample before creating anything, so a bad
    // recording cannot leave a half-enrolled account behind.
    let mut embeddings = Vec::with_capacity(fields.samples.len());
    for sample in &fields.samples {
        if sample.len() > auth_state.config().max_audio_bytes() {
            return (
                StatusCode::BAD_REQUEST,
                "Audio file too large".to_string(),
            )
                .into_response();
        }
        let samples = match audio::decode_wav(sample) {
            Ok(samples) => samples,
            Err(err) => {
                warn!("Enrollment audio decode failed: {err}");
                return (StatusCode::BAD_REQUEST, "Malformed audio".to_string()).into_response();
            }
        };
        match auth_state.encoder().embed(&samples).await {
            Ok(live) => embeddings.push(live),
            Err(err) => {
                error!("Speaker encoder failed during enrollment: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Enrollment failed".to_string(),
                )
                    .into_response();
            }
        }
    }

    let pin_hash = match hash_pin(&fields.pin) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash PIN: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Enrollment failed".to_string(),
            )
                .into_response();
        }
    };

    // IDs are minted here because the ciphertext AAD binds them.
    let account_id = Uuid::new_v4();
    let mut voiceprints = Vec::with_capacity(embeddings.len());
    for live in &embeddings {
        let voiceprint_id = Uuid::new_v4();
        let sealed = match crypto::encrypt_embedding(
            auth_state.voiceprint_key(),
            &embedding::to_bytes(live),
            account_id,
            voiceprint_id,
        ) {
            Ok(sealed) => sealed,
            Err(err) => {
                error!("Failed to encrypt voiceprint: {err}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Enrollment failed".to_string(),
                )
                    .into_response();
            }
        };
        voiceprints.push((voiceprint_id, sealed));
    }

    match storage::insert_enrollment(&pool, account_id, &username, &pin_hash, &voiceprints).await {
        Ok(EnrollOutcome::Created) => {
            info!(username = %username, samples = voiceprints.len(), "account enrolled");
            (
                StatusCode::CREATED,
                Json(EnrollResponse {
                    username,
                    samples: voiceprints.len(),
                }),
            )
                .into_response()
        }
        Ok(EnrollOutcome::Conflict) => (
            StatusCode::CONFLICT,
            "Username already taken".to_string(),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to insert enrollment: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Enrollment failed".to_string(),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::test_support::auth_state;
    use super::*;
    use anyhow::Result;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{Request, header::CONTENT_TYPE};
    use sqlx::postgres::PgPoolOptions;

    const BOUNDARY: &str = "voxpass-test-boundary";

    fn multipart_body(fields: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    async fn multipart_from(fields: &[(&str, &[u8])]) -> Result<Multipart> {
        let request = Request::builder()
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(fields))?;
        Multipart::from_request(request, &()).await.map_err(|err| {
            anyhow::anyhow!("failed to build multipart extractor: {err}")
        })
    }

    #[tokio::test]
    async fn enroll_requires_audio_sample() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let multipart =
            multipart_from(&[("username", b"alice".as_slice()), ("pin", b"1234".as_slice())])
                .await?;
        let response = enroll(Extension(pool), Extension(auth_state()), multipart)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn enroll_rejects_malformed_audio() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let multipart = multipart_from(&[
            ("username", b"alice".as_slice()),
            ("pin", b"1234".as_slice()),
            ("audio", b"not-a-wav-file".as_slice()),
        ])
        .await?;
        let response = enroll(Extension(pool), Extension(auth_state()), multipart)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn enroll_rejects_bad_pin_shape() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let multipart = multipart_from(&[
            ("username", b"alice".as_slice()),
            ("pin", b"pin".as_slice()),
            ("audio", b"RIFF".as_slice()),
        ])
        .await?;
        let response = enroll(Extension(pool), Extension(auth_state()), multipart)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
