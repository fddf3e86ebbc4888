//! Auth handlers and supporting modules.
//!
//! This module coordinates the voice-plus-PIN login flow: challenge
//! issuing, multipart login verification, enrollment, and bearer-token
//! sessions.
//!
//! ## Lockout
//!
//! Failed attempts that count toward lockout (wrong PIN, bad audio,
//! voice mismatch) increment `accounts.failed_attempts` atomically;
//! 5 failures lock the account for 15 minutes. Locked accounts answer
//! with their lock expiry so clients can show a countdown; every other
//! failure collapses to one generic message.
//!
//! ## Challenges
//!
//! At most one live challenge exists per account. A challenge is
//! consumed exactly once, only after the submitted audio decodes, so a
//! PIN typo or a broken upload does not burn the phrase.

mod audit;
pub(crate) mod challenge;
pub(crate) mod enroll;
pub(crate) mod login;
mod precheck;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod types;
mod utils;

pub use state::{AuthConfig, AuthState};
