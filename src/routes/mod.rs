//! Route modules and router assembly
//!
//! Organizes the demo server's routes:
//! - Health endpoint at root level (/health), unauthenticated
//! - Wallet-gated endpoints under /api/v1/ behind the auth middleware
//!
//! Protected routes are registered with their full paths (no `nest`):
//! challenges bind to the request path as the middleware observes it, and
//! nesting would strip the prefix from that view.

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::middleware::WalletAuthLayer;

pub mod health;
pub mod whoami;

/// Shared application state: the immutable protocol configuration.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
}

/// Creates the main API router with all routes.
///
/// Route structure:
/// - `/health` - Health check (root level, unauthenticated)
/// - `/api/v1/whoami` - Echoes the authenticated wallet address
pub fn api_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/whoami", get(whoami::whoami))
        .route_layer(WalletAuthLayer::new(state.auth.clone()));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(protected)
}
