//! Wallet authentication middleware
//!
//! Tower middleware that speaks the OpenKitx403 handshake on behalf of the
//! routes it wraps:
//! 1. Requests without an `Authorization` header are answered 403 with a
//!    fresh `WWW-Authenticate` challenge
//! 2. Proof-bearing requests run the verification pipeline
//! 3. Every rejection carries a fresh challenge so the client can retry
//!    without a separate round-trip
//! 4. Successful verifications inject `WalletContext` into request
//!    extensions and stamp `X-Authenticated-Address` on the response

use axum::{
    body::Body,
    http::{header, HeaderValue, Request, Response, StatusCode},
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::services::challenge::{build_challenge, www_authenticate_value};
use crate::services::verifier::verify_request;
use crate::types::{AuthErrorBody, Challenge};

/// Response header carrying the proven address.
pub const X_AUTHENTICATED_ADDRESS: &str = "x-authenticated-address";
/// Header name for request ID (used for logging)
pub const X_REQUEST_ID: &str = "x-request-id";

/// Wallet context injected into request extensions after successful
/// verification.
#[derive(Debug, Clone)]
pub struct WalletContext {
    /// Base58 public key that proved ownership.
    pub address: String,
    /// The challenge the proof covered, including its `ext` object.
    pub challenge: Challenge,
}

/// Tower layer for wallet authentication.
#[derive(Clone)]
pub struct WalletAuthLayer {
    config: Arc<AuthConfig>,
}

impl WalletAuthLayer {
    /// Creates a layer around the given protocol configuration.
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for WalletAuthLayer {
    type Service = WalletAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WalletAuthMiddleware {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Wallet authentication middleware service.
#[derive(Clone)]
pub struct WalletAuthMiddleware<S> {
    inner: S,
    config: Arc<AuthConfig>,
}

impl<S> Service<Request<Body>> for WalletAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let inner = self.inner.clone();
        let config = self.config.clone();

        // We need to take ownership of the service for the async block
        let mut inner = std::mem::replace(&mut self.inner, inner);

        Box::pin(async move {
            let request_id = extract_request_id(&request);
            let method = request.method().as_str().to_string();
            let path = request.uri().path().to_string();

            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);

            let Some(auth_header) = auth_header else {
                tracing::debug!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    "no authorization header, issuing challenge"
                );
                return Ok(challenge_response(
                    &AuthError::WalletAuthRequired,
                    &method,
                    &path,
                    &config,
                ));
            };

            match verify_request(&auth_header, &method, &path, Some(request.headers()), &config)
                .await
            {
                Ok(wallet) => {
                    tracing::info!(
                        request_id = %request_id,
                        address = %wallet.address,
                        "wallet authentication successful"
                    );

                    let address_header = HeaderValue::from_str(&wallet.address).ok();

                    let mut request = request;
                    request.extensions_mut().insert(request_id);
                    request.extensions_mut().insert(WalletContext {
                        address: wallet.address,
                        challenge: wallet.challenge,
                    });

                    let mut response = inner.call(request).await?;
                    if let Some(value) = address_header {
                        response
                            .headers_mut()
                            .insert(X_AUTHENTICATED_ADDRESS, value);
                    }
                    Ok(response)
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %request_id,
                        method = %method,
                        path = %path,
                        code = err.code(),
                        error = %err,
                        "wallet authentication rejected"
                    );
                    Ok(challenge_response(&err, &method, &path, &config))
                }
            }
        })
    }
}

/// Extracts request ID from request headers or generates a new one
fn extract_request_id(request: &Request<Body>) -> Uuid {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Builds the 403 rejection: a fresh challenge for the current request's
/// method and path plus the `{"error", "error_description"}` body.
fn challenge_response(
    err: &AuthError,
    method: &str,
    path: &str,
    config: &AuthConfig,
) -> Response<Body> {
    let challenge = build_challenge(method, path, config, None);
    let body = AuthErrorBody::new(err.code(), err.error_description());
    let json_body = serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string());

    let mut builder = Response::builder()
        .status(err.status_code())
        .header(header::CONTENT_TYPE, "application/json");

    match www_authenticate_value(&challenge) {
        Ok(value) => {
            builder = builder.header(header::WWW_AUTHENTICATE, value);
        }
        Err(e) => {
            // The rejection still goes out; the client just has to ask again.
            tracing::error!(error = %e, "failed to serialize fresh challenge");
        }
    }

    builder.body(Body::from(json_body)).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .unwrap()
    })
}
