//! Wire encoding primitives
//!
//! base64url and base58 codecs, RFC 3339 second-precision timestamps, and
//! nonce generation shared by the challenge builder, the proof helper, and
//! the verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// Timestamp layout on the wire: second precision, `Z` suffix, nothing else.
/// Fractional seconds and numeric offsets do not parse.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Nonce width in bytes. 16 bytes = 128 bits of entropy.
pub const NONCE_LEN: usize = 16;

/// Errors from the codec layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("invalid base64url data")]
    InvalidBase64Url,

    #[error("invalid base58 data")]
    InvalidBase58,

    #[error("expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),
}

/// Encodes bytes as base64url without padding (RFC 4648).
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decodes base64url, tolerating the padded variant older clients emit.
///
/// Trailing `=` is stripped before decoding; padding is never re-emitted.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, EncodingError> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|_| EncodingError::InvalidBase64Url)
}

/// Encodes bytes with the Bitcoin base58 alphabet.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

/// Decodes base58 and enforces an exact byte length.
///
/// Public keys must decode to 32 bytes and signatures to 64; anything else
/// is a hard rejection.
pub fn base58_decode_exact(input: &str, expected: usize) -> Result<Vec<u8>, EncodingError> {
    let bytes = bs58::decode(input)
        .into_vec()
        .map_err(|_| EncodingError::InvalidBase58)?;

    if bytes.len() != expected {
        return Err(EncodingError::WrongLength {
            expected,
            actual: bytes.len(),
        });
    }

    Ok(bytes)
}

/// Formats an instant as `YYYY-MM-DDTHH:MM:SSZ`, truncating sub-second
/// precision.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a wire timestamp.
///
/// The format is matched exactly: fractional seconds, offsets other than
/// `Z`, or a missing `Z` all fail.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, EncodingError> {
    NaiveDateTime::parse_from_str(input, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| EncodingError::InvalidTimestamp(input.to_string()))
}

/// Generates a fresh random nonce: 128 bits from the OS RNG, base64url.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut bytes);
    base64url_encode(&bytes)
}
