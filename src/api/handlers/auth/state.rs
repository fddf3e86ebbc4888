//! Auth state and configuration.

use secrecy::{ExposeSecret, SecretBox, SecretString};
use std::sync::Arc;

use crate::voiceprint::encoder::SpeakerEncoder;

use super::utils::hash_pin;

const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MAX_FAILED_ATTEMPTS: i32 = 5;
const DEFAULT_LOCKOUT_SECONDS: i64 = 15 * 60;
const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;
const DEFAULT_MAX_AUDIO_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_MAX_ENROLL_SAMPLES: usize = 5;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    challenge_ttl_seconds: i64,
    token_ttl_seconds: i64,
    max_failed_attempts: i32,
    lockout_seconds: i64,
    similarity_threshold: f32,
    max_audio_bytes: usize,
    max_enroll_samples: usize,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_seconds: DEFAULT_LOCKOUT_SECONDS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            max_enroll_samples: DEFAULT_MAX_ENROLL_SAMPLES,
        }
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: i32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_seconds(mut self, seconds: i64) -> Self {
        self.lockout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_max_audio_bytes(mut self, bytes: usize) -> Self {
        self.max_audio_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_max_enroll_samples(mut self, samples: usize) -> Self {
        self.max_enroll_samples = samples;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> i32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_seconds(&self) -> i64 {
        self.lockout_seconds
    }

    #[must_use]
    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    #[must_use]
    pub fn max_audio_bytes(&self) -> usize {
        self.max_audio_bytes
    }

    #[must_use]
    pub fn max_enroll_samples(&self) -> usize {
        self.max_enroll_samples
    }
}

pub struct AuthState {
    config: AuthConfig,
    encoder: Arc<dyn SpeakerEncoder>,
    token_secret: SecretString,
    voiceprint_key: SecretBox<[u8; 32]>,
    /// Verified against when a username has no account, so lookup misses
    /// cost the same as PIN mismatches.
    dummy_pin_hash: String,
}

impl AuthState {
    /// Build shared auth state.
    ///
    /// # Errors
    /// Returns an error if the decoy PIN hash cannot be produced.
    pub fn new(
        config: AuthConfig,
        encoder: Arc<dyn SpeakerEncoder>,
        token_secret: SecretString,
        voiceprint_key: [u8; 32],
    ) -> anyhow::Result<Self> {
        let dummy_pin_hash = hash_pin("00000000")?;
        Ok(Self {
            config,
            encoder,
            token_secret,
            voiceprint_key: SecretBox::new(Box::new(voiceprint_key)),
            dummy_pin_hash,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn encoder(&self) -> &dyn SpeakerEncoder {
        self.encoder.as_ref()
    }

    pub(crate) fn token_secret(&self) -> &[u8] {
        self.token_secret.expose_secret().as_bytes()
    }

    pub(crate) fn voiceprint_key(&self) -> &[u8; 32] {
        self.voiceprint_key.expose_secret()
    }

    pub(super) fn dummy_pin_hash(&self) -> &str {
        &self.dummy_pin_hash
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::voiceprint::encoder::test_support::FakeEncoder;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("http://localhost:3000".to_string());

        assert_eq!(config.frontend_base_url(), "http://localhost:3000");
        assert_eq!(
            config.challenge_ttl_seconds(),
            super::DEFAULT_CHALLENGE_TTL_SECONDS
        );
        assert_eq!(config.token_ttl_seconds(), super::DEFAULT_TOKEN_TTL_SECONDS);
        assert_eq!(
            config.max_failed_attempts(),
            super::DEFAULT_MAX_FAILED_ATTEMPTS
        );
        assert_eq!(config.lockout_seconds(), super::DEFAULT_LOCKOUT_SECONDS);
        assert!((config.similarity_threshold() - 0.75).abs() < f32::EPSILON);

        let config = config
            .with_challenge_ttl_seconds(60)
            .with_token_ttl_seconds(3_600)
            .with_max_failed_attempts(3)
            .with_lockout_seconds(120)
            .with_similarity_threshold(0.9)
            .with_max_audio_bytes(1_024)
            .with_max_enroll_samples(2);

        assert_eq!(config.challenge_ttl_seconds(), 60);
        assert_eq!(config.token_ttl_seconds(), 3_600);
        assert_eq!(config.max_failed_attempts(), 3);
        assert_eq!(config.lockout_seconds(), 120);
        assert!((config.similarity_threshold() - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.max_audio_bytes(), 1_024);
        assert_eq!(config.max_enroll_samples(), 2);
    }

    #[test]
    fn auth_state_exposes_secret_material_to_the_crate() -> anyhow::Result<()> {
        let state = AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            Arc::new(FakeEncoder),
            SecretString::from("super-secret"),
            [1u8; 32],
        )?;
        assert_eq!(state.token_secret(), b"super-secret");
        assert_eq!(state.voiceprint_key(), &[1u8; 32]);
        assert!(state.dummy_pin_hash().starts_with("$argon2"));
        Ok(())
    }
}
