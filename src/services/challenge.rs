//! Challenge issuance and signing-string derivation
//!
//! Builds the server's commitment for a given method and path, renders the
//! `WWW-Authenticate` header value, and derives the byte string both sides
//! sign. The signing string is a wire contract: any deviation in key order,
//! whitespace, or line breaks makes signatures incompatible.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};

use crate::config::AuthConfig;
use crate::services::encoding;
use crate::types::{Challenge, PROTOCOL_VERSION, SCHEME, SIGNATURE_ALG};

/// Builds a fresh challenge bound to the request's method and path.
///
/// Two successive calls with identical inputs differ only in `nonce`, `ts`,
/// and `exp`.
pub fn build_challenge(
    method: &str,
    path: &str,
    config: &AuthConfig,
    ext: Option<Value>,
) -> Challenge {
    let now = Utc::now();
    let exp = now + Duration::seconds(config.ttl_seconds);

    Challenge {
        v: PROTOCOL_VERSION,
        alg: SIGNATURE_ALG.to_string(),
        nonce: encoding::generate_nonce(),
        ts: encoding::format_timestamp(now),
        aud: config.audience.clone(),
        method: method.to_string(),
        path: path.to_string(),
        ua_bind: config.ua_binding,
        origin_bind: config.origin_binding,
        server_id: config.issuer.clone(),
        exp: encoding::format_timestamp(exp),
        ext: ext.unwrap_or_else(|| Value::Object(Map::new())),
    }
}

/// Renders the `WWW-Authenticate` header value carrying the challenge.
pub fn www_authenticate_value(challenge: &Challenge) -> Result<String, serde_json::Error> {
    let blob = encoding::base64url_encode(challenge.canonical_json()?.as_bytes());
    Ok(format!(
        r#"{SCHEME} realm="{}", version="{}", challenge="{blob}""#,
        challenge.server_id, challenge.v
    ))
}

/// Derives the exact byte string the client signs and the server verifies.
pub fn signing_string(challenge: &Challenge) -> Result<String, serde_json::Error> {
    let payload = challenge.canonical_json()?;
    Ok(format!(
        "{SCHEME} Challenge\n\ndomain: {}\nserver: {}\nnonce: {}\nts: {}\nmethod: {}\npath: {}\n\npayload: {payload}",
        challenge.aud, challenge.server_id, challenge.nonce, challenge.ts, challenge.method, challenge.path
    ))
}
