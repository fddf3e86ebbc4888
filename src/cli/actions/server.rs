use crate::api;
use crate::api::handlers::auth::{AuthConfig, AuthState};
use crate::voiceprint::encoder::HttpSpeakerEncoder;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub encoder_url: String,
    pub token_secret: String,
    pub voiceprint_key: [u8; 32],
    pub frontend_base_url: String,
    pub challenge_ttl_seconds: i64,
    pub token_ttl_seconds: i64,
    pub max_failed_attempts: i32,
    pub lockout_seconds: i64,
    pub similarity_threshold: f32,
    pub max_audio_bytes: usize,
    pub max_enroll_samples: usize,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the encoder client or auth state cannot be built,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.frontend_base_url)
        .with_challenge_ttl_seconds(args.challenge_ttl_seconds)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_max_failed_attempts(args.max_failed_attempts)
        .with_lockout_seconds(args.lockout_seconds)
        .with_similarity_threshold(args.similarity_threshold)
        .with_max_audio_bytes(args.max_audio_bytes)
        .with_max_enroll_samples(args.max_enroll_samples);

    let encoder =
        HttpSpeakerEncoder::new(&args.encoder_url).context("Failed to build encoder client")?;

    let auth_state = AuthState::new(
        config,
        Arc::new(encoder),
        SecretString::from(args.token_secret),
        args.voiceprint_key,
    )
    .context("Failed to build auth state")?;

    api::new(args.port, args.dsn, Arc::new(auth_state)).await
}
