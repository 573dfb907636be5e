//! # Melodia account service
//!
//! User-account backend for the Melodia media player: registration gated by
//! emailed verification codes, credential login with signed session tokens,
//! password reset, third-party platform linking, and avatar storage.
//!
//! Two small components carry the design contract:
//!
//! - [`token`] — a stateless authority that mints and verifies HMAC-signed
//!   session tokens. Any instance can validate a token without shared session
//!   storage; in exchange there is no early revocation.
//! - [`verification`] — an in-memory registry of single-use, 5-minute
//!   verification codes keyed by normalized email, swept periodically in the
//!   background.
//!
//! Everything else is request plumbing: axum handlers under [`api`], the user
//! table behind `sqlx`, and outbound email behind a small sender trait.

pub mod api;
pub mod cli;
pub mod token;
pub mod verification;
