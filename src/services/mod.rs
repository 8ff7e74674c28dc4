//! Protocol engine services
//!
//! Challenge issuance, signing-string derivation, encoding primitives,
//! replay protection, proof construction, and the verification pipeline.

pub mod challenge;
pub mod encoding;
pub mod proof;
pub mod replay_store;
pub mod verifier;

pub use challenge::{build_challenge, signing_string, www_authenticate_value};
pub use encoding::{
    base58_decode_exact, base58_encode, base64url_decode, base64url_encode, generate_nonce,
    EncodingError,
};
pub use proof::{parse_www_authenticate, sign_challenge, ChallengeParams, ProofError};
pub use replay_store::{
    InMemoryReplayStore, ReplayStore, ReplayStoreError, DEFAULT_REPLAY_CAPACITY,
};
pub use verifier::{verify_request, TokenGate, TokenGateError, VerifiedWallet};
