//! Client for the out-of-process speaker-encoder model.
//!
//! Embedding extraction is CPU-heavy ML inference and runs in a dedicated
//! sidecar service; this module owns only the wire contract. The trait seam
//! keeps handlers testable without a model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, info_span};
use url::Url;

use super::audio::CANONICAL_SAMPLE_RATE;
use super::embedding;

/// Inference requests comfortably finish within this; the encoder must not
/// hold account locks, so a generous ceiling is safe.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("speaker encoder unreachable: {0}")]
    Unreachable(String),
    #[error("speaker encoder returned status {0}")]
    Status(u16),
    #[error("speaker encoder returned an invalid embedding: {0}")]
    InvalidEmbedding(#[from] embedding::EmbeddingError),
    #[error("speaker encoder response could not be decoded")]
    Decode,
}

#[async_trait]
pub trait SpeakerEncoder: Send + Sync {
    /// Extract a fixed-length embedding from canonical 16 kHz mono samples.
    async fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, EncoderError>;

    /// Cheap reachability probe for `/health`.
    async fn ready(&self) -> bool;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    sample_rate: u32,
    samples: &'a [f32],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Production encoder: posts samples to an inference sidecar over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSpeakerEncoder {
    client: reqwest::Client,
    embed_url: Url,
    health_url: Url,
}

impl HttpSpeakerEncoder {
    /// Build a client for the encoder base URL (e.g. `http://encoder:9000`).
    ///
    /// # Errors
    /// Returns an error if the URL cannot be parsed or the client cannot
    /// be constructed.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("Invalid encoder URL {base_url}: {e}"))?;
        let embed_url = base
            .join("/embed")
            .map_err(|e| anyhow::anyhow!("Invalid encoder URL {base_url}: {e}"))?;
        let health_url = base
            .join("/health")
            .map_err(|e| anyhow::anyhow!("Invalid encoder URL {base_url}: {e}"))?;
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build encoder HTTP client: {e}"))?;
        Ok(Self {
            client,
            embed_url,
            health_url,
        })
    }
}

#[async_trait]
impl SpeakerEncoder for HttpSpeakerEncoder {
    async fn embed(&self, samples: &[f32]) -> Result<Vec<f32>, EncoderError> {
        let span = info_span!(
            "encoder.embed",
            http.method = "POST",
            url = %self.embed_url,
            audio.samples = samples.len()
        );
        async {
            let response = self
                .client
                .post(self.embed_url.clone())
                .json(&EmbedRequest {
                    sample_rate: CANONICAL_SAMPLE_RATE,
                    samples,
                })
                .send()
                .await
                .map_err(|e| EncoderError::Unreachable(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(EncoderError::Status(status.as_u16()));
            }

            let body: EmbedResponse = response.json().await.map_err(|_| EncoderError::Decode)?;
            embedding::validate(&body.embedding)?;
            Ok(body.embedding)
        }
        .instrument(span)
        .await
    }

    async fn ready(&self) -> bool {
        match self.client.get(self.health_url.clone()).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
