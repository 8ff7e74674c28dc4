//! Authorization header
//!
//! Parses `Authorization: OpenKitx403 k="v", …` into a typed parameter set
//! and re-emits it for clients.

use thiserror::Error;

/// Authentication scheme token. Case-sensitive on the wire.
pub const SCHEME: &str = "OpenKitx403";

/// Parameter keys the protocol requires.
const REQUIRED_KEYS: [&str; 5] = ["addr", "sig", "challenge", "ts", "nonce"];

/// The client's proof, one field per header parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    /// Base58 Ed25519 public key (32 bytes decoded).
    pub addr: String,
    /// Base58 signature (64 bytes decoded).
    pub sig: String,
    /// Echo of the base64url challenge blob the server issued.
    pub challenge: String,
    /// Client timestamp, RFC 3339 seconds with `Z`.
    pub ts: String,
    /// Client-random nonce.
    pub nonce: String,
    /// Optional `"METHOD:PATH"` binding.
    pub bind: Option<String>,
}

/// Why a header value failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationParseError {
    #[error("authorization scheme is not {SCHEME}")]
    UnknownScheme,

    #[error("malformed parameter list near '{0}'")]
    Malformed(String),

    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),
}

impl Authorization {
    /// Parses a raw `Authorization` header value.
    ///
    /// Parameters are comma-separated `key="value"` pairs; values carry no
    /// embedded quotes or backslashes in this protocol version. Unknown
    /// keys are ignored and duplicate keys take the last value.
    pub fn parse(header: &str) -> Result<Self, AuthorizationParseError> {
        let rest = header
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix(' '))
            .ok_or(AuthorizationParseError::UnknownScheme)?;

        let mut addr = None;
        let mut sig = None;
        let mut challenge = None;
        let mut ts = None;
        let mut nonce = None;
        let mut bind = None;

        let mut remaining = rest.trim_start();
        while !remaining.is_empty() {
            let (key, value, after) = take_parameter(remaining)?;
            match key {
                "addr" => addr = Some(value.to_string()),
                "sig" => sig = Some(value.to_string()),
                "challenge" => challenge = Some(value.to_string()),
                "ts" => ts = Some(value.to_string()),
                "nonce" => nonce = Some(value.to_string()),
                "bind" => bind = Some(value.to_string()),
                _ => {}
            }

            remaining = after.trim_start();
            match remaining.strip_prefix(',') {
                Some(r) => remaining = r.trim_start(),
                None if remaining.is_empty() => {}
                None => {
                    return Err(AuthorizationParseError::Malformed(snippet(remaining)));
                }
            }
        }

        Ok(Self {
            addr: addr.ok_or(AuthorizationParseError::MissingParameter(REQUIRED_KEYS[0]))?,
            sig: sig.ok_or(AuthorizationParseError::MissingParameter(REQUIRED_KEYS[1]))?,
            challenge: challenge
                .ok_or(AuthorizationParseError::MissingParameter(REQUIRED_KEYS[2]))?,
            ts: ts.ok_or(AuthorizationParseError::MissingParameter(REQUIRED_KEYS[3]))?,
            nonce: nonce.ok_or(AuthorizationParseError::MissingParameter(REQUIRED_KEYS[4]))?,
            bind,
        })
    }

    /// Re-emits the header value this proof parses from.
    pub fn to_header_value(&self) -> String {
        let mut value = format!(
            r#"{SCHEME} addr="{}", sig="{}", challenge="{}", ts="{}", nonce="{}""#,
            self.addr, self.sig, self.challenge, self.ts, self.nonce
        );
        if let Some(bind) = &self.bind {
            value.push_str(&format!(r#", bind="{bind}""#));
        }
        value
    }
}

/// Consumes one `key="value"` pair, returning the key, the value, and the
/// unconsumed tail. Commas inside the quoted value are preserved.
pub(crate) fn take_parameter(
    input: &str,
) -> Result<(&str, &str, &str), AuthorizationParseError> {
    let eq = input
        .find('=')
        .ok_or_else(|| AuthorizationParseError::Malformed(snippet(input)))?;

    let key = input[..eq].trim_end();
    let valid_key = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid_key {
        return Err(AuthorizationParseError::Malformed(snippet(input)));
    }

    let after_eq = input[eq + 1..]
        .strip_prefix('"')
        .ok_or_else(|| AuthorizationParseError::Malformed(snippet(input)))?;
    let close = after_eq
        .find('"')
        .ok_or_else(|| AuthorizationParseError::Malformed(snippet(input)))?;

    Ok((key, &after_eq[..close], &after_eq[close + 1..]))
}

/// Truncated context for parse error messages.
fn snippet(input: &str) -> String {
    input.chars().take(24).collect()
}
