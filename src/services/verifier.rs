//! Verification pipeline
//!
//! Turns a raw authorization header plus the actual request into either an
//! authenticated wallet address or a single rejection code. The check order
//! is part of the protocol: cheap structural checks run before
//! cryptography, policy checks run before replay state is consulted, and
//! the replay store is only written after the signature proves the caller
//! holds the key, so a forged proof can never burn a legitimate nonce.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use chrono::Utc;
use ed25519_dalek::{Signature, Verifier as _, VerifyingKey};
use subtle::ConstantTimeEq as _;
use thiserror::Error;
use url::Url;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::services::challenge::signing_string;
use crate::services::encoding;
use crate::types::{Authorization, Challenge, PROTOCOL_VERSION, SIGNATURE_ALG};

/// A token-gate predicate refused or broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TokenGateError(pub String);

/// User-supplied predicate over a proven base58 address, gating access on
/// external state such as on-chain holdings.
#[async_trait]
pub trait TokenGate: Send + Sync {
    /// Returns whether the address may pass.
    async fn allow(&self, address: &str) -> Result<bool, TokenGateError>;
}

/// Successful verification result handed back to the host.
#[derive(Debug, Clone)]
pub struct VerifiedWallet {
    /// Base58 public key that proved ownership.
    pub address: String,
    /// The decoded challenge the proof covered.
    pub challenge: Challenge,
}

/// Runs the full verification pipeline over an incoming proof.
///
/// `headers` feeds the origin and user-agent binding checks; hosts that
/// cannot supply request headers pass `None` and those checks are skipped.
/// The first failing check produces the result.
pub async fn verify_request(
    auth_header: &str,
    method: &str,
    path: &str,
    headers: Option<&HeaderMap>,
    config: &AuthConfig,
) -> Result<VerifiedWallet, AuthError> {
    // 1. Parse the authorization header.
    let auth = Authorization::parse(auth_header)
        .map_err(|e| AuthError::InvalidRequest(e.to_string()))?;

    // 2. Decode and parse the echoed challenge.
    let challenge_bytes = encoding::base64url_decode(&auth.challenge)
        .map_err(|_| AuthError::InvalidChallenge("challenge is not valid base64url".to_string()))?;
    let challenge = Challenge::from_json_bytes(&challenge_bytes)
        .map_err(|e| AuthError::InvalidChallenge(e.to_string()))?;

    // 3. Protocol version.
    if challenge.v != PROTOCOL_VERSION {
        return Err(AuthError::UnsupportedVersion);
    }

    // 4. Signature algorithm.
    if !ct_eq(&challenge.alg, SIGNATURE_ALG) {
        return Err(AuthError::UnsupportedAlgorithm);
    }

    // 5. Challenge expiry.
    let expires_at = encoding::parse_timestamp(&challenge.exp)
        .map_err(|_| AuthError::InvalidChallenge("unparseable exp timestamp".to_string()))?;
    let now = Utc::now();
    if now >= expires_at {
        return Err(AuthError::ChallengeExpired);
    }

    // 6. Audience.
    if !ct_eq(&challenge.aud, &config.audience) {
        return Err(AuthError::AudienceMismatch);
    }

    // 7. Server identity.
    if !ct_eq(&challenge.server_id, &config.issuer) {
        return Err(AuthError::ServerIdMismatch);
    }

    // 8. Client timestamp skew.
    let client_ts = encoding::parse_timestamp(&auth.ts).map_err(|_| AuthError::TimestampSkew)?;
    if (now - client_ts).num_seconds().abs() > config.clock_skew_seconds {
        return Err(AuthError::TimestampSkew);
    }

    // 9. Method/path binding. Enforced unconditionally when enabled: a
    // proof without a bind parameter is rejected, and the live request
    // must also match what the challenge was issued for.
    if config.bind_method_path {
        let bind = auth.bind.as_deref().ok_or(AuthError::BindingMismatch)?;
        let (bind_method, bind_path) =
            bind.split_once(':').ok_or(AuthError::BindingMismatch)?;
        if bind_method != method || bind_path != path {
            return Err(AuthError::BindingMismatch);
        }
        if challenge.method != method || challenge.path != path {
            return Err(AuthError::BindingMismatch);
        }
    }

    // 10. Origin binding.
    if challenge.origin_bind {
        if let Some(headers) = headers {
            let origin = headers
                .get(header::ORIGIN)
                .or_else(|| headers.get(header::REFERER))
                .and_then(|v| v.to_str().ok())
                .ok_or(AuthError::OriginMismatch)?;
            if !origins_match(origin, &challenge.aud) {
                return Err(AuthError::OriginMismatch);
            }
        }
    }

    // 11. User-agent binding.
    if challenge.ua_bind {
        if let Some(headers) = headers {
            let present = headers
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|ua| !ua.is_empty());
            if !present {
                return Err(AuthError::UserAgentRequired);
            }
        }
    }

    // 12. Replay check. Insertion is deferred to after the signature
    // proves the caller holds the key.
    let replay_key = format!("{}:{}", auth.addr, challenge.nonce);
    if let Some(store) = &config.replay_store {
        let seen = store
            .check(&replay_key, config.ttl_seconds)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "replay store check failed");
                AuthError::ReplayStoreUnavailable
            })?;
        if seen {
            return Err(AuthError::ReplayDetected);
        }
    }

    // 13. Ed25519 signature over the recomputed signing string.
    let public_key_bytes = encoding::base58_decode_exact(&auth.addr, 32)
        .map_err(|_| AuthError::InvalidSignature)?;
    let public_key: [u8; 32] = public_key_bytes
        .try_into()
        .map_err(|_| AuthError::InvalidSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&public_key).map_err(|_| AuthError::InvalidSignature)?;

    let signature_bytes = encoding::base58_decode_exact(&auth.sig, 64)
        .map_err(|_| AuthError::InvalidSignature)?;
    let signature_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| AuthError::InvalidSignature)?;
    let signature = Signature::from_bytes(&signature_array);

    let message = signing_string(&challenge)
        .map_err(|e| AuthError::InvalidChallenge(e.to_string()))?;
    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| AuthError::InvalidSignature)?;

    // Record the nonce now that the proof is authentic. The atomic
    // compare-and-insert closes the race between concurrent retries.
    if let Some(store) = &config.replay_store {
        let ttl_remaining = (expires_at - now).num_seconds().max(1);
        let seen = store
            .check_and_store(&replay_key, ttl_remaining)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "replay store insert failed");
                AuthError::ReplayStoreUnavailable
            })?;
        if seen {
            return Err(AuthError::ReplayDetected);
        }
    }

    // 14. Token gate, bounded so a slow predicate cannot stall the server.
    if let Some(gate) = &config.token_gate {
        let timeout = std::time::Duration::from_secs(config.token_gate_timeout_secs);
        match tokio::time::timeout(timeout, gate.allow(&auth.addr)).await {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                return Err(AuthError::TokenGateFailed("address not allowed".to_string()));
            }
            Ok(Err(e)) => return Err(AuthError::TokenGateFailed(e.to_string())),
            Err(_) => {
                return Err(AuthError::TokenGateFailed("token gate timed out".to_string()));
            }
        }
    }

    // 15. Authenticated.
    Ok(VerifiedWallet {
        address: auth.addr,
        challenge,
    })
}

/// Constant-time string equality for values an attacker controls one side
/// of. Length still leaks; the contents do not.
fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Compares the origin components of two URLs, normalizing default ports
/// (`https://a.ex` equals `https://a.ex:443`).
fn origins_match(origin: &str, audience: &str) -> bool {
    match (Url::parse(origin), Url::parse(audience)) {
        (Ok(origin), Ok(audience)) => origin.origin() == audience.origin(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::challenge::build_challenge;
    use crate::services::proof::sign_challenge;
    use crate::services::replay_store::{InMemoryReplayStore, ReplayStore, ReplayStoreError};
    use assert_matches::assert_matches;
    use axum::http::HeaderValue;
    use ed25519_dalek::SigningKey;
    use serde_json::json;
    use std::sync::Arc;

    const METHOD: &str = "GET";
    const PATH: &str = "/protected";

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn test_config() -> AuthConfig {
        AuthConfig::new("srv", "https://a.ex")
            .with_replay_store(Arc::new(InMemoryReplayStore::with_default_capacity()))
    }

    fn challenge_blob(challenge: &Challenge) -> String {
        encoding::base64url_encode(challenge.canonical_json().unwrap().as_bytes())
    }

    /// Signs `challenge` and returns a complete authorization header value.
    fn proof_header(challenge: &Challenge) -> String {
        sign_challenge(&signing_key(), &challenge_blob(challenge), METHOD, PATH)
            .unwrap()
            .to_header_value()
    }

    async fn verify(header: &str, config: &AuthConfig) -> Result<VerifiedWallet, AuthError> {
        verify_request(header, METHOD, PATH, None, config).await
    }

    #[tokio::test]
    async fn accepts_a_well_formed_proof() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let wallet = verify(&proof_header(&challenge), &config).await.unwrap();

        let expected_addr =
            encoding::base58_encode(signing_key().verifying_key().as_bytes());
        assert_eq!(wallet.address, expected_addr);
        assert_eq!(wallet.challenge.nonce, challenge.nonce);
    }

    #[tokio::test]
    async fn rejects_a_malformed_header() {
        let config = test_config();
        let result = verify("Bearer abc123", &config).await;
        assert_matches!(result, Err(AuthError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn rejects_an_undecodable_challenge() {
        let config = test_config();
        let header = concat!(
            r#"OpenKitx403 addr="a", sig="s", challenge="%%not-base64%%", "#,
            r#"ts="2026-01-01T00:00:00Z", nonce="n""#,
        );
        let result = verify(header, &config).await;
        assert_matches!(result, Err(AuthError::InvalidChallenge(_)));
    }

    #[tokio::test]
    async fn rejects_an_unsupported_version_before_anything_else() {
        let config = test_config();
        let mut challenge = build_challenge(METHOD, PATH, &config, None);
        challenge.v = 2;
        // The signature cannot cover the tampered payload; the version
        // check still wins because it runs first.
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::UnsupportedVersion));
    }

    #[tokio::test]
    async fn rejects_a_bare_ed25519_identifier() {
        let config = test_config();
        let mut challenge = build_challenge(METHOD, PATH, &config, None);
        challenge.alg = "ed25519".to_string();
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::UnsupportedAlgorithm));
    }

    #[tokio::test]
    async fn rejects_an_expired_challenge() {
        let config = test_config();
        let mut challenge = build_challenge(METHOD, PATH, &config, None);
        challenge.exp = encoding::format_timestamp(Utc::now() - chrono::Duration::seconds(1));
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::ChallengeExpired));
    }

    #[tokio::test]
    async fn rejects_a_foreign_audience() {
        let config = test_config();
        let mut challenge = build_challenge(METHOD, PATH, &config, None);
        challenge.aud = "https://evil.ex".to_string();
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::AudienceMismatch));
    }

    #[tokio::test]
    async fn rejects_a_foreign_server_id() {
        let config = test_config();
        let mut challenge = build_challenge(METHOD, PATH, &config, None);
        challenge.server_id = "other".to_string();
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::ServerIdMismatch));
    }

    #[tokio::test]
    async fn rejects_a_skewed_client_timestamp() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), METHOD, PATH).unwrap();
        auth.ts = encoding::format_timestamp(Utc::now() + chrono::Duration::seconds(300));
        let result = verify(&auth.to_header_value(), &config).await;
        assert_matches!(result, Err(AuthError::TimestampSkew));
    }

    #[tokio::test]
    async fn rejects_a_missing_bind_when_binding_is_enabled() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), METHOD, PATH).unwrap();
        auth.bind = None;
        let result = verify(&auth.to_header_value(), &config).await;
        assert_matches!(result, Err(AuthError::BindingMismatch));
    }

    #[tokio::test]
    async fn accepts_a_missing_bind_when_binding_is_disabled() {
        let config = test_config().with_bind_method_path(false);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), METHOD, PATH).unwrap();
        auth.bind = None;
        assert!(verify(&auth.to_header_value(), &config).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_a_bind_for_a_different_route() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), "POST", "/other").unwrap();
        let result = verify(&auth.to_header_value(), &config).await;
        assert_matches!(result, Err(AuthError::BindingMismatch));
    }

    #[tokio::test]
    async fn rejects_a_challenge_issued_for_a_different_route() {
        let config = test_config();
        let challenge = build_challenge("POST", "/other", &config, None);
        // bind matches the live request, but the challenge was issued for
        // another route.
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::BindingMismatch));
    }

    #[tokio::test]
    async fn rejects_a_foreign_origin() {
        let config = test_config().with_origin_binding(true);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://other.ex"));
        let result =
            verify_request(&proof_header(&challenge), METHOD, PATH, Some(&headers), &config).await;
        assert_matches!(result, Err(AuthError::OriginMismatch));
    }

    #[tokio::test]
    async fn origin_comparison_normalizes_default_ports() {
        let config = test_config().with_origin_binding(true);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://a.ex:443"));
        let result =
            verify_request(&proof_header(&challenge), METHOD, PATH, Some(&headers), &config).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn falls_back_to_the_referer_header() {
        let config = test_config().with_origin_binding(true);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://a.ex/some/page"),
        );
        let result =
            verify_request(&proof_header(&challenge), METHOD, PATH, Some(&headers), &config).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn requires_a_user_agent_when_bound() {
        let config = test_config().with_ua_binding(true);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let headers = HeaderMap::new();
        let result =
            verify_request(&proof_header(&challenge), METHOD, PATH, Some(&headers), &config).await;
        assert_matches!(result, Err(AuthError::UserAgentRequired));
    }

    #[tokio::test]
    async fn detects_a_replayed_proof() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let header = proof_header(&challenge);

        assert!(verify(&header, &config).await.is_ok());
        let result = verify(&header, &config).await;
        assert_matches!(result, Err(AuthError::ReplayDetected));
    }

    #[tokio::test]
    async fn expiry_wins_over_replay_for_a_burned_nonce() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        assert!(verify(&proof_header(&challenge), &config).await.is_ok());

        // Same nonce, now expired: the TTL check runs before the store is
        // consulted.
        let mut expired = challenge.clone();
        expired.exp = encoding::format_timestamp(Utc::now() - chrono::Duration::seconds(1));
        let result = verify(&proof_header(&expired), &config).await;
        assert_matches!(result, Err(AuthError::ChallengeExpired));
    }

    #[tokio::test]
    async fn a_tampered_signature_does_not_burn_the_nonce() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), METHOD, PATH).unwrap();

        let mut sig_bytes = encoding::base58_decode_exact(&auth.sig, 64).unwrap();
        sig_bytes[0] ^= 0x01;
        let mut tampered = auth.clone();
        tampered.sig = encoding::base58_encode(&sig_bytes);

        let result = verify(&tampered.to_header_value(), &config).await;
        assert_matches!(result, Err(AuthError::InvalidSignature));

        // The legitimate holder can still present the original proof.
        assert!(verify(&auth.to_header_value(), &config).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_an_address_of_the_wrong_length() {
        let config = test_config();
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let mut auth =
            sign_challenge(&signing_key(), &challenge_blob(&challenge), METHOD, PATH).unwrap();
        auth.addr = encoding::base58_encode(&[1u8; 31]);
        let result = verify(&auth.to_header_value(), &config).await;
        assert_matches!(result, Err(AuthError::InvalidSignature));
    }

    struct DenyGate;

    #[async_trait]
    impl TokenGate for DenyGate {
        async fn allow(&self, _address: &str) -> Result<bool, TokenGateError> {
            Ok(false)
        }
    }

    struct SlowGate;

    #[async_trait]
    impl TokenGate for SlowGate {
        async fn allow(&self, _address: &str) -> Result<bool, TokenGateError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn surfaces_a_denying_token_gate() {
        let config = test_config().with_token_gate(Arc::new(DenyGate));
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::TokenGateFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn bounds_a_slow_token_gate() {
        let config = test_config()
            .with_token_gate(Arc::new(SlowGate))
            .with_token_gate_timeout_secs(2);
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(
            result,
            Err(AuthError::TokenGateFailed(ref reason)) if reason.contains("timed out")
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl ReplayStore for BrokenStore {
        async fn check(&self, _key: &str, _ttl: i64) -> Result<bool, ReplayStoreError> {
            Err(ReplayStoreError("connection refused".to_string()))
        }

        async fn store(&self, _key: &str, _ttl: i64) -> Result<(), ReplayStoreError> {
            Err(ReplayStoreError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn a_store_outage_fails_closed() {
        let config =
            AuthConfig::new("srv", "https://a.ex").with_replay_store(Arc::new(BrokenStore));
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let result = verify(&proof_header(&challenge), &config).await;
        assert_matches!(result, Err(AuthError::ReplayStoreUnavailable));
    }

    #[tokio::test]
    async fn runs_without_a_replay_store() {
        let config = AuthConfig::new("srv", "https://a.ex");
        let challenge = build_challenge(METHOD, PATH, &config, None);
        let header = proof_header(&challenge);
        // No store configured: replays are the deployment's problem.
        assert!(verify(&header, &config).await.is_ok());
        assert!(verify(&header, &config).await.is_ok());
    }

    #[tokio::test]
    async fn carries_the_ext_object_through_verification() {
        let config = test_config();
        let challenge =
            build_challenge(METHOD, PATH, &config, Some(json!({"scope": "read"})));
        let wallet = verify(&proof_header(&challenge), &config).await.unwrap();
        assert_eq!(wallet.challenge.ext, json!({"scope": "read"}));
    }
}
