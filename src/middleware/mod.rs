//! Middleware modules
//!
//! Contains the wallet authentication middleware for protecting routes.

pub mod wallet_auth;

pub use wallet_auth::{
    WalletAuthLayer, WalletAuthMiddleware, WalletContext, X_AUTHENTICATED_ADDRESS,
};
