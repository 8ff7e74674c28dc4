//! Client-side proof construction
//!
//! Completes the handshake from the client's seat: parses the server's
//! `WWW-Authenticate` value, signs the derived signing string with an
//! Ed25519 key, and assembles the `Authorization` proof. Browser wallet
//! discovery lives elsewhere; this module only needs a signing key.

use chrono::Utc;
use ed25519_dalek::{Signer as _, SigningKey};
use thiserror::Error;

use crate::services::challenge::signing_string;
use crate::services::encoding;
use crate::types::authorization::take_parameter;
use crate::types::{Authorization, Challenge, SCHEME};

/// Parameters a server advertises in `WWW-Authenticate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeParams {
    /// Server identifier / realm.
    pub realm: String,
    /// Advertised protocol version.
    pub version: String,
    /// The base64url challenge blob to echo back.
    pub challenge: String,
}

/// Why a proof could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    #[error("www-authenticate scheme is not {SCHEME}")]
    UnknownScheme,

    #[error("malformed www-authenticate value")]
    MalformedHeader,

    #[error("www-authenticate is missing '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid challenge payload: {0}")]
    InvalidChallenge(String),
}

/// Parses a `WWW-Authenticate` header value into its challenge parameters.
pub fn parse_www_authenticate(value: &str) -> Result<ChallengeParams, ProofError> {
    let rest = value
        .strip_prefix(SCHEME)
        .and_then(|r| r.strip_prefix(' '))
        .ok_or(ProofError::UnknownScheme)?;

    let mut realm = None;
    let mut version = None;
    let mut challenge = None;

    let mut remaining = rest.trim_start();
    while !remaining.is_empty() {
        let (key, param, after) =
            take_parameter(remaining).map_err(|_| ProofError::MalformedHeader)?;
        match key {
            "realm" => realm = Some(param.to_string()),
            "version" => version = Some(param.to_string()),
            "challenge" => challenge = Some(param.to_string()),
            _ => {}
        }

        remaining = after.trim_start();
        match remaining.strip_prefix(',') {
            Some(r) => remaining = r.trim_start(),
            None if remaining.is_empty() => {}
            None => return Err(ProofError::MalformedHeader),
        }
    }

    Ok(ChallengeParams {
        realm: realm.ok_or(ProofError::MissingParameter("realm"))?,
        version: version.ok_or(ProofError::MissingParameter("version"))?,
        challenge: challenge.ok_or(ProofError::MissingParameter("challenge"))?,
    })
}

/// Signs a received challenge blob for a request about to be made.
///
/// The challenge is echoed verbatim, the signature covers the signing
/// string derived from it, and `bind` ties the proof to the given method
/// and path.
pub fn sign_challenge(
    key: &SigningKey,
    challenge_b64: &str,
    method: &str,
    path: &str,
) -> Result<Authorization, ProofError> {
    let bytes = encoding::base64url_decode(challenge_b64)
        .map_err(|_| ProofError::InvalidChallenge("not valid base64url".to_string()))?;
    let challenge = Challenge::from_json_bytes(&bytes)
        .map_err(|e| ProofError::InvalidChallenge(e.to_string()))?;

    let message =
        signing_string(&challenge).map_err(|e| ProofError::InvalidChallenge(e.to_string()))?;
    let signature = key.sign(message.as_bytes());

    Ok(Authorization {
        addr: encoding::base58_encode(key.verifying_key().as_bytes()),
        sig: encoding::base58_encode(&signature.to_bytes()),
        challenge: challenge_b64.to_string(),
        ts: encoding::format_timestamp(Utc::now()),
        nonce: encoding::generate_nonce(),
        bind: Some(format!("{method}:{path}")),
    })
}
