use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

pub const ARG_ENCODER_URL: &str = "encoder-url";
pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_VOICEPRINT_KEY: &str = "voiceprint-key";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_challenge_args(command);
    with_verifier_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENCODER_URL)
                .long(ARG_ENCODER_URL)
                .help("Base URL of the speaker-encoder inference service")
                .env("VOXPASS_ENCODER_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret for signing session tokens (min 32 bytes)")
                .env("VOXPASS_TOKEN_SECRET")
                .required(true)
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_VOICEPRINT_KEY)
                .long(ARG_VOICEPRINT_KEY)
                .help("Voiceprint encryption key, 64 hex characters (AES-256)")
                .env("VOXPASS_VOICEPRINT_KEY")
                .required(true)
                .hide_env_values(true),
        )
}

fn with_challenge_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend origin allowed by CORS")
                .env("VOXPASS_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("challenge-ttl-seconds")
                .long("challenge-ttl-seconds")
                .help("Spoken challenge TTL in seconds")
                .env("VOXPASS_CHALLENGE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Session token TTL in seconds")
                .env("VOXPASS_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_verifier_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("max-failed-attempts")
                .long("max-failed-attempts")
                .help("Failed attempts before the account locks")
                .env("VOXPASS_MAX_FAILED_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new("lockout-seconds")
                .long("lockout-seconds")
                .help("Account lockout duration in seconds")
                .env("VOXPASS_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("similarity-threshold")
                .long("similarity-threshold")
                .help("Minimum cosine similarity accepted as a voice match")
                .env("VOXPASS_SIMILARITY_THRESHOLD")
                .default_value("0.75")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("max-audio-bytes")
                .long("max-audio-bytes")
                .help("Upload ceiling for a single audio sample in bytes")
                .env("VOXPASS_MAX_AUDIO_BYTES")
                .default_value("5242880")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("max-enroll-samples")
                .long("max-enroll-samples")
                .help("Maximum enrollment samples accepted per account")
                .env("VOXPASS_MAX_ENROLL_SAMPLES")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
}

#[derive(Debug)]
pub struct Options {
    pub encoder_url: String,
    pub token_secret: String,
    pub voiceprint_key_hex: String,
    pub frontend_base_url: String,
    pub challenge_ttl_seconds: i64,
    pub token_ttl_seconds: i64,
    pub max_failed_attempts: i32,
    pub lockout_seconds: i64,
    pub similarity_threshold: f32,
    pub max_audio_bytes: usize,
    pub max_enroll_samples: usize,
}

impl Options {
    /// Collect auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            encoder_url: matches
                .get_one::<String>(ARG_ENCODER_URL)
                .cloned()
                .context("missing required argument: --encoder-url")?,
            token_secret: matches
                .get_one::<String>(ARG_TOKEN_SECRET)
                .cloned()
                .context("missing required argument: --token-secret")?,
            voiceprint_key_hex: matches
                .get_one::<String>(ARG_VOICEPRINT_KEY)
                .cloned()
                .context("missing required argument: --voiceprint-key")?,
            frontend_base_url: matches
                .get_one::<String>("frontend-base-url")
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            challenge_ttl_seconds: matches
                .get_one::<i64>("challenge-ttl-seconds")
                .copied()
                .unwrap_or(300),
            token_ttl_seconds: matches
                .get_one::<i64>("token-ttl-seconds")
                .copied()
                .unwrap_or(86_400),
            max_failed_attempts: matches
                .get_one::<i32>("max-failed-attempts")
                .copied()
                .unwrap_or(5),
            lockout_seconds: matches
                .get_one::<i64>("lockout-seconds")
                .copied()
                .unwrap_or(900),
            similarity_threshold: matches
                .get_one::<f32>("similarity-threshold")
                .copied()
                .unwrap_or(0.75),
            max_audio_bytes: matches
                .get_one::<usize>("max-audio-bytes")
                .copied()
                .unwrap_or(5 * 1024 * 1024),
            max_enroll_samples: matches
                .get_one::<usize>("max-enroll-samples")
                .copied()
                .unwrap_or(5),
        })
    }
}
