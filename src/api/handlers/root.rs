use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::instrument;

// axum handler for the service banner
#[instrument]
pub async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(json!({
            "message": "Voxpass backend is running",
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::root;
    use anyhow::Result;
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    #[tokio::test]
    async fn root_returns_banner() -> Result<()> {
        let response = root().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), 1024).await?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(
            value.get("name").and_then(serde_json::Value::as_str),
            Some(env!("CARGO_PKG_NAME"))
        );
        Ok(())
    }
}
