//! Protocol wire types
//!
//! The challenge payload, the authorization proof, and the JSON body shape
//! every rejection carries.

pub mod authorization;
pub mod challenge;

pub use authorization::{Authorization, AuthorizationParseError, SCHEME};
pub use challenge::{Challenge, PROTOCOL_VERSION, SIGNATURE_ALG};

use serde::{Deserialize, Serialize};

/// JSON body attached to every 403 on the authentication path:
/// `{"error":"<code>","error_description":"<text>"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthErrorBody {
    pub error: String,
    pub error_description: String,
}

impl AuthErrorBody {
    /// Creates an error body from a wire code and its description.
    pub fn new(error: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: error_description.into(),
        }
    }
}
