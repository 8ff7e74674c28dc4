//! Authenticated identity route
//!
//! Demonstrates the point where verification returns control to the host:
//! the handler reads the injected wallet context and answers with it.

use axum::{Extension, Json};
use serde::Serialize;
use serde_json::Value;

use crate::middleware::WalletContext;

/// Response for the whoami endpoint.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    /// The authenticated base58 wallet address.
    pub address: String,
    /// Server that issued the verified challenge.
    pub server: String,
    /// Extension object carried through the challenge.
    pub ext: Value,
}

/// GET /api/v1/whoami - Returns the authenticated wallet identity.
pub async fn whoami(Extension(wallet): Extension<WalletContext>) -> Json<WhoamiResponse> {
    Json(WhoamiResponse {
        address: wallet.address,
        server: wallet.challenge.server_id,
        ext: wallet.challenge.ext,
    })
}
