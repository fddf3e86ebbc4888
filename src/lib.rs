//! # Voxpass (Voice + PIN Multi-Factor Authentication)
//!
//! `voxpass` authenticates principals with two factors: a numeric PIN
//! (argon2id-hashed at rest) and a voiceprint comparison against encrypted
//! enrollment embeddings produced by an external speaker-encoder model.
//!
//! ## Challenge-Response Flow
//!
//! Logins are bound to a single-use spoken challenge:
//!
//! 1. `POST /v1/auth/challenge` pre-checks `{username, pin}` and issues a
//!    short speakable phrase with a fixed expiry window.
//! 2. The client records the phrase and submits
//!    `POST /v1/auth/login` (multipart: username, pin, audio).
//! 3. The verifier re-validates the PIN, consumes the challenge exactly
//!    once, extracts an embedding from the audio, and compares it against
//!    the account's enrollment voiceprints by cosine similarity.
//!
//! ## Lockout
//!
//! Every failed attempt increments a per-account counter in a single
//! atomic statement; reaching the configured maximum locks the account
//! for a fixed window. Lock state is surfaced to callers (a locked-out
//! user is told until when), while all other authentication failures
//! collapse to one generic message to prevent account enumeration.
//!
//! ## Sessions
//!
//! Successful verification mints an HMAC-signed, time-bound bearer token.
//! Protected endpoints re-validate signature and expiry on every request;
//! there is no server-side session store and no revocation list.

pub mod api;
pub mod cli;
pub mod token;
pub mod voiceprint;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
