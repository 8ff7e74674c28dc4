//! OpenKitx403 — stateless HTTP-native wallet authentication.
//!
//! A server answers an unauthenticated request with HTTP 403 carrying a
//! fresh, short-lived challenge in `WWW-Authenticate`. The client signs a
//! deterministic string derived from that challenge with its Ed25519 wallet
//! key and retries with an `Authorization` proof. The server re-verifies
//! everything it committed to at issue time, enforces replay protection,
//! and hands the proven base58 address to the host.
//!
//! The crate splits into:
//! - [`types`]: the challenge and authorization wire types
//! - [`services`]: encoding primitives, challenge issuance, the replay
//!   store, proof construction, and the verification pipeline
//! - [`middleware`]: a tower layer wiring the handshake into axum routes
//! - [`config`] / [`error`]: immutable server configuration and the closed
//!   set of rejection codes

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod types;

pub use config::{AppConfig, AuthConfig};
pub use error::AuthError;
pub use middleware::{WalletAuthLayer, WalletContext, X_AUTHENTICATED_ADDRESS};
pub use services::{
    build_challenge, parse_www_authenticate, sign_challenge, signing_string, verify_request,
    www_authenticate_value, InMemoryReplayStore, ReplayStore, TokenGate, VerifiedWallet,
};
pub use types::{Authorization, Challenge};
