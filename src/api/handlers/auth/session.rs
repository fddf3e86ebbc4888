//! Bearer-token session verification.
//!
//! Tokens are stateless: signature and expiry are re-checked on every
//! request, so this endpoint doubles as the reference implementation for
//! any future protected route.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::token::verify_hs256;

use super::state::AuthState;
use super::types::SessionResponse;

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 401, description = "Missing, invalid, or expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
    };

    let claims = match verify_hs256(&token, auth_state.token_secret(), Utc::now().timestamp()) {
        Ok(claims) => claims,
        Err(err) => {
            debug!("Session token rejected: {err}");
            return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
        }
    };

    let Some(expires_at) = DateTime::from_timestamp(claims.exp, 0) else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response();
    };

    (
        StatusCode::OK,
        Json(SessionResponse {
            username: claims.sub,
            role: claims.role,
            expires_at,
        }),
    )
        .into_response()
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::super::state::test_support::auth_state;
    use super::*;
    use crate::token::{SessionTokenClaims, sign_hs256};
    use anyhow::Result;
    use axum::http::HeaderValue;

    fn bearer_headers(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        Ok(headers)
    }

    #[tokio::test]
    async fn session_rejects_missing_header() {
        let response = session(HeaderMap::new(), Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn session_rejects_garbage_token() -> Result<()> {
        let response = session(bearer_headers("garbage")?, Extension(auth_state()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn session_accepts_fresh_token() -> Result<()> {
        let state = auth_state();
        let claims =
            SessionTokenClaims::new("alice", "user", Utc::now().timestamp(), 3_600);
        let token = sign_hs256(state.token_secret(), &claims)
            .map_err(|err| anyhow::anyhow!("sign failed: {err}"))?;
        let response = session(bearer_headers(&token)?, Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn session_rejects_expired_token() -> Result<()> {
        let state = auth_state();
        let claims =
            SessionTokenClaims::new("alice", "user", Utc::now().timestamp() - 7_200, 3_600);
        let token = sign_hs256(state.token_secret(), &claims)
            .map_err(|err| anyhow::anyhow!("sign failed: {err}"))?;
        let response = session(bearer_headers(&token)?, Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[test]
    fn bearer_extraction_handles_case_and_whitespace() -> Result<()> {
        let headers = bearer_headers("abc")?;
        assert_eq!(extract_bearer_token(&headers), Some("abc".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer  xyz "));
        assert_eq!(extract_bearer_token(&headers), Some("xyz".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_bearer_token(&headers), None);
        Ok(())
    }
}
