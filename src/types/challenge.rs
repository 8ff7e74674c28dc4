//! Challenge payload
//!
//! The server's commitment to what a valid proof must cover. Carried
//! base64url-encoded inside `WWW-Authenticate`, echoed back verbatim by the
//! client, and re-validated field by field on the retry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version emitted and accepted.
pub const PROTOCOL_VERSION: u32 = 1;

/// The single signature algorithm this protocol version speaks: Ed25519
/// over a Solana-style base58 public key.
pub const SIGNATURE_ALG: &str = "ed25519-solana";

/// Server challenge as it appears on the wire.
///
/// `ts` and `exp` stay strings here; the verifier parses them at the steps
/// that need an instant. Unknown fields fail deserialization — a field this
/// struct cannot carry would be dropped by canonical re-serialization and
/// the signature could never verify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Challenge {
    /// Protocol version, always `1`.
    pub v: u32,
    /// Signature algorithm identifier.
    pub alg: String,
    /// Server-random nonce, base64url, at least 96 bits.
    pub nonce: String,
    /// Issue time, RFC 3339 seconds with `Z`.
    pub ts: String,
    /// Expected audience origin (scheme + host + port).
    pub aud: String,
    /// HTTP method this challenge is bound to.
    pub method: String,
    /// Request path this challenge is bound to.
    pub path: String,
    /// Whether the retry must carry a `User-Agent` header.
    #[serde(rename = "uaBind")]
    pub ua_bind: bool,
    /// Whether the retry's `Origin`/`Referer` must match `aud`.
    #[serde(rename = "originBind")]
    pub origin_bind: bool,
    /// Server identifier, also used as the realm.
    #[serde(rename = "serverId")]
    pub server_id: String,
    /// Expiry, RFC 3339 seconds with `Z`.
    pub exp: String,
    /// Open-ended extension object; `{}` when unused.
    pub ext: Value,
}

impl Challenge {
    /// Serializes to canonical JSON: keys in byte-lexicographic order, no
    /// insignificant whitespace.
    ///
    /// Routing through `serde_json::Value` makes every object a sorted map
    /// (serde_json's default map is a `BTreeMap`), including nested objects
    /// inside `ext`.
    pub fn canonical_json(&self) -> Result<String, serde_json::Error> {
        let value = serde_json::to_value(self)?;
        serde_json::to_string(&value)
    }

    /// Parses a challenge from raw JSON bytes.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    pub(crate) fn fixture() -> Challenge {
        Challenge {
            v: PROTOCOL_VERSION,
            alg: SIGNATURE_ALG.to_string(),
            nonce: "AAAAAAAAAAAAAAAAAAAAAA".to_string(),
            ts: "2026-01-01T00:00:00Z".to_string(),
            aud: "https://a.ex".to_string(),
            method: "GET".to_string(),
            path: "/protected".to_string(),
            ua_bind: false,
            origin_bind: false,
            server_id: "srv".to_string(),
            exp: "2026-01-01T00:01:00Z".to_string(),
            ext: json!({}),
        }
    }

    #[test]
    fn canonical_json_golden_vector() {
        let expected = concat!(
            r#"{"alg":"ed25519-solana","aud":"https://a.ex","exp":"2026-01-01T00:01:00Z","#,
            r#""ext":{},"method":"GET","nonce":"AAAAAAAAAAAAAAAAAAAAAA","originBind":false,"#,
            r#""path":"/protected","serverId":"srv","ts":"2026-01-01T00:00:00Z","#,
            r#""uaBind":false,"v":1}"#,
        );
        assert_eq!(fixture().canonical_json().unwrap(), expected);
    }

    #[test]
    fn canonical_json_sorts_nested_ext_keys() {
        let mut challenge = fixture();
        challenge.ext = json!({"zeta": 1, "alpha": {"b": 2, "a": 1}});
        let canonical = challenge.canonical_json().unwrap();
        assert!(canonical.contains(r#""ext":{"alpha":{"a":1,"b":2},"zeta":1}"#));
    }

    #[test]
    fn round_trips_through_canonical_form() {
        let challenge = fixture();
        let canonical = challenge.canonical_json().unwrap();
        let parsed = Challenge::from_json_bytes(canonical.as_bytes()).unwrap();
        assert_eq!(parsed, challenge);
    }

    #[test]
    fn rejects_unknown_fields() {
        let mut value = serde_json::to_value(fixture()).unwrap();
        value["extra"] = json!("surprise");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(Challenge::from_json_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        let mut value = serde_json::to_value(fixture()).unwrap();
        value.as_object_mut().unwrap().remove("nonce");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(Challenge::from_json_bytes(&bytes).is_err());
    }
}
