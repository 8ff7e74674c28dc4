//! Protocol error handling
//!
//! The closed set of rejection codes surfaced on the authentication path.
//! Every code maps to HTTP 403; errors are returned to the caller together
//! with a fresh challenge, never thrown across component boundaries.

use axum::http::StatusCode;
use thiserror::Error;

/// Wire error codes carried in the rejection body.
pub mod codes {
    pub const WALLET_AUTH_REQUIRED: &str = "wallet_auth_required";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_CHALLENGE: &str = "invalid_challenge";
    pub const UNSUPPORTED_VERSION: &str = "unsupported_version";
    pub const UNSUPPORTED_ALGORITHM: &str = "unsupported_algorithm";
    pub const CHALLENGE_EXPIRED: &str = "challenge_expired";
    pub const AUDIENCE_MISMATCH: &str = "audience_mismatch";
    pub const SERVER_ID_MISMATCH: &str = "server_id_mismatch";
    pub const TIMESTAMP_SKEW: &str = "timestamp_skew";
    pub const BINDING_MISMATCH: &str = "binding_mismatch";
    pub const ORIGIN_MISMATCH: &str = "origin_mismatch";
    pub const USER_AGENT_REQUIRED: &str = "user_agent_required";
    pub const REPLAY_DETECTED: &str = "replay_detected";
    pub const INVALID_SIGNATURE: &str = "invalid_signature";
    pub const TOKEN_GATE_FAILED: &str = "token_gate_failed";
}

/// Verification failure. One variant per pipeline rejection; the variant
/// order mirrors the check order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("wallet authentication required")]
    WalletAuthRequired,

    #[error("invalid authorization header: {0}")]
    InvalidRequest(String),

    #[error("invalid challenge payload: {0}")]
    InvalidChallenge(String),

    #[error("unsupported protocol version")]
    UnsupportedVersion,

    #[error("unsupported signature algorithm")]
    UnsupportedAlgorithm,

    #[error("challenge has expired")]
    ChallengeExpired,

    #[error("challenge audience does not match this server")]
    AudienceMismatch,

    #[error("challenge server id does not match this server")]
    ServerIdMismatch,

    #[error("client timestamp is outside the allowed skew window")]
    TimestampSkew,

    #[error("proof is not bound to this method and path")]
    BindingMismatch,

    #[error("request origin does not match the challenge audience")]
    OriginMismatch,

    #[error("a user-agent header is required")]
    UserAgentRequired,

    #[error("challenge nonce has already been used")]
    ReplayDetected,

    // Fail closed when the store cannot answer. Shares the replay_detected
    // wire code; the description tells operators which case they hit.
    #[error("replay protection is unavailable")]
    ReplayStoreUnavailable,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("token gate rejected the address: {0}")]
    TokenGateFailed(String),
}

impl AuthError {
    /// Returns the wire error code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::WalletAuthRequired => codes::WALLET_AUTH_REQUIRED,
            AuthError::InvalidRequest(_) => codes::INVALID_REQUEST,
            AuthError::InvalidChallenge(_) => codes::INVALID_CHALLENGE,
            AuthError::UnsupportedVersion => codes::UNSUPPORTED_VERSION,
            AuthError::UnsupportedAlgorithm => codes::UNSUPPORTED_ALGORITHM,
            AuthError::ChallengeExpired => codes::CHALLENGE_EXPIRED,
            AuthError::AudienceMismatch => codes::AUDIENCE_MISMATCH,
            AuthError::ServerIdMismatch => codes::SERVER_ID_MISMATCH,
            AuthError::TimestampSkew => codes::TIMESTAMP_SKEW,
            AuthError::BindingMismatch => codes::BINDING_MISMATCH,
            AuthError::OriginMismatch => codes::ORIGIN_MISMATCH,
            AuthError::UserAgentRequired => codes::USER_AGENT_REQUIRED,
            AuthError::ReplayDetected | AuthError::ReplayStoreUnavailable => {
                codes::REPLAY_DETECTED
            }
            AuthError::InvalidSignature => codes::INVALID_SIGNATURE,
            AuthError::TokenGateFailed(_) => codes::TOKEN_GATE_FAILED,
        }
    }

    /// Returns the HTTP status for this rejection. The authentication path
    /// only ever emits 403.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    /// Human-readable text for the `error_description` body field.
    pub fn error_description(&self) -> String {
        self.to_string()
    }
}
