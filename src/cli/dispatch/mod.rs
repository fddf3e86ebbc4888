//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the
//! appropriate action, such as starting the API server with its full
//! configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::auth;
use anyhow::{Context, Result, anyhow};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    if auth_opts.token_secret.len() < 32 {
        return Err(anyhow!("--token-secret must be at least 32 bytes"));
    }
    let voiceprint_key = parse_voiceprint_key(&auth_opts.voiceprint_key_hex)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        encoder_url: auth_opts.encoder_url,
        token_secret: auth_opts.token_secret,
        voiceprint_key,
        frontend_base_url: auth_opts.frontend_base_url,
        challenge_ttl_seconds: auth_opts.challenge_ttl_seconds,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        max_failed_attempts: auth_opts.max_failed_attempts,
        lockout_seconds: auth_opts.lockout_seconds,
        similarity_threshold: auth_opts.similarity_threshold,
        max_audio_bytes: auth_opts.max_audio_bytes,
        max_enroll_samples: auth_opts.max_enroll_samples,
    }))
}

fn parse_voiceprint_key(key_hex: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(key_hex.trim())
        .map_err(|_| anyhow!("--voiceprint-key must be hex encoded"))?;
    bytes
        .try_into()
        .map_err(|_| anyhow!("--voiceprint-key must decode to exactly 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f000102030405060708090a0b0c0d0e0f";

    fn matches_from(args: Vec<&str>) -> clap::ArgMatches {
        crate::cli::commands::new().get_matches_from(args)
    }

    fn base_args() -> Vec<&'static str> {
        vec![
            "voxpass",
            "--dsn",
            "postgres://user@localhost:5432/voxpass",
            "--encoder-url",
            "http://encoder:9000",
            "--token-secret",
            "a-test-secret-at-least-32-bytes!",
            "--voiceprint-key",
            KEY_HEX,
        ]
    }

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        temp_env::with_vars([("VOXPASS_PORT", None::<&str>)], || {
            let matches = matches_from(base_args());
            let Action::Server(args) = handler(&matches)?;
            assert_eq!(args.port, 8080);
            assert_eq!(args.encoder_url, "http://encoder:9000");
            assert_eq!(args.voiceprint_key[0], 0x00);
            assert_eq!(args.voiceprint_key[15], 0x0f);
            assert_eq!(args.max_failed_attempts, 5);
            Ok(())
        })
    }

    #[test]
    fn handler_rejects_short_token_secret() {
        let mut args = base_args();
        args[6] = "too-short";
        let matches = matches_from(args);
        let result = handler(&matches);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("at least 32 bytes"));
        }
    }

    #[test]
    fn handler_rejects_bad_key_hex() {
        let mut args = base_args();
        args[8] = "not-hex";
        let matches = matches_from(args);
        assert!(handler(&matches).is_err());
    }

    #[test]
    fn handler_rejects_short_key() {
        let mut args = base_args();
        args[8] = "00ff00ff";
        let matches = matches_from(args);
        let result = handler(&matches);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("exactly 32 bytes"));
        }
    }
}
