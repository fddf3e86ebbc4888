//! API handlers for Voxpass.
//!
//! `auth/` holds the challenge/login/enroll/session flow; `health` and
//! `root` are operational endpoints.

pub mod auth;
pub mod health;
pub mod root;
