//! Application configuration
//!
//! `AuthConfig` is the immutable per-server protocol configuration handed to
//! the verifier and the middleware. `AppConfig` layers the demo server's
//! environment variables on top with sensible local defaults.

use std::env;
use std::fmt;
use std::sync::Arc;

use dotenvy::dotenv;

use crate::services::replay_store::ReplayStore;
use crate::services::verifier::TokenGate;

/// Default challenge lifetime in seconds.
pub const DEFAULT_TTL_SECONDS: i64 = 60;

/// Default allowed clock skew for the client timestamp, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 120;

/// Default bound on a token-gate predicate call, in seconds.
pub const DEFAULT_TOKEN_GATE_TIMEOUT_SECS: u64 = 2;

/// Per-server protocol parameters. Built once at server construction and
/// never mutated; downstream code holds a read-only `Arc`.
#[derive(Clone)]
pub struct AuthConfig {
    /// Server identifier, emitted as `serverId` and as the realm.
    pub issuer: String,
    /// Expected audience origin (scheme + host + port).
    pub audience: String,
    /// Challenge lifetime. Recommended at most 300.
    pub ttl_seconds: i64,
    /// Require the proof's `bind` parameter to match the request.
    pub bind_method_path: bool,
    /// Bind retries to the challenge audience via `Origin`/`Referer`.
    pub origin_binding: bool,
    /// Require retries to carry a `User-Agent` header.
    pub ua_binding: bool,
    /// Allowed distance between the client timestamp and server time.
    pub clock_skew_seconds: i64,
    /// Bound on a single token-gate predicate call.
    pub token_gate_timeout_secs: u64,
    /// Used-nonce tracking; `None` disables replay protection.
    pub replay_store: Option<Arc<dyn ReplayStore>>,
    /// Address-level access predicate; `None` admits every proven address.
    pub token_gate: Option<Arc<dyn TokenGate>>,
}

impl AuthConfig {
    /// Creates a configuration with protocol defaults: 60-second TTL,
    /// method/path binding on, origin and user-agent binding off, 120
    /// seconds of clock skew, no replay store, no token gate.
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            bind_method_path: true,
            origin_binding: false,
            ua_binding: false,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            token_gate_timeout_secs: DEFAULT_TOKEN_GATE_TIMEOUT_SECS,
            replay_store: None,
            token_gate: None,
        }
    }

    /// Sets the challenge lifetime.
    #[must_use]
    pub fn with_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Enables or disables method/path binding enforcement.
    #[must_use]
    pub fn with_bind_method_path(mut self, enabled: bool) -> Self {
        self.bind_method_path = enabled;
        self
    }

    /// Enables or disables origin binding.
    #[must_use]
    pub fn with_origin_binding(mut self, enabled: bool) -> Self {
        self.origin_binding = enabled;
        self
    }

    /// Enables or disables user-agent binding.
    #[must_use]
    pub fn with_ua_binding(mut self, enabled: bool) -> Self {
        self.ua_binding = enabled;
        self
    }

    /// Sets the allowed clock skew.
    #[must_use]
    pub fn with_clock_skew_seconds(mut self, skew_seconds: i64) -> Self {
        self.clock_skew_seconds = skew_seconds;
        self
    }

    /// Sets the token-gate timeout.
    #[must_use]
    pub fn with_token_gate_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.token_gate_timeout_secs = timeout_secs;
        self
    }

    /// Installs a replay store.
    #[must_use]
    pub fn with_replay_store(mut self, store: Arc<dyn ReplayStore>) -> Self {
        self.replay_store = Some(store);
        self
    }

    /// Installs a token-gate predicate.
    #[must_use]
    pub fn with_token_gate(mut self, gate: Arc<dyn TokenGate>) -> Self {
        self.token_gate = Some(gate);
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("bind_method_path", &self.bind_method_path)
            .field("origin_binding", &self.origin_binding)
            .field("ua_binding", &self.ua_binding)
            .field("clock_skew_seconds", &self.clock_skew_seconds)
            .field("token_gate_timeout_secs", &self.token_gate_timeout_secs)
            .field("replay_store", &self.replay_store.is_some())
            .field("token_gate", &self.token_gate.is_some())
            .finish()
    }
}

/// Demo server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server identifier / realm.
    pub issuer: String,

    /// Expected audience origin.
    pub audience: String,

    /// Challenge TTL in seconds (default: 60).
    pub ttl_seconds: i64,

    /// Enforce method/path binding (default: true).
    pub bind_method_path: bool,

    /// Enforce origin binding (default: false).
    pub origin_binding: bool,

    /// Enforce user-agent binding (default: false).
    pub ua_binding: bool,

    /// Allowed client clock skew in seconds (default: 120).
    pub clock_skew_seconds: i64,

    /// Token-gate timeout in seconds (default: 2).
    pub token_gate_timeout_secs: u64,

    /// In-memory replay store capacity (default: 10000).
    pub replay_capacity: usize,

    /// HTTP server host (default: 0.0.0.0).
    pub host: String,

    /// HTTP server port (default: 8080).
    pub port: u16,

    /// CORS allowed origins (comma-separated, default: localhost dev ports).
    pub cors_origins: Vec<String>,

    /// Log format: "json" for structured, "pretty" for human-readable.
    pub log_format: String,

    /// Graceful shutdown timeout in seconds (default: 30).
    pub shutdown_timeout_secs: u64,
}

impl AppConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults for local development if variables
    /// are not set.
    pub fn load() -> Self {
        // Load .env file if it exists
        dotenv().ok();

        let cors_origins_str = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://localhost:8081".to_string());
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            issuer: env::var("OPENKITX403_ISSUER")
                .unwrap_or_else(|_| "openkitx403-dev".to_string()),
            audience: env::var("OPENKITX403_AUDIENCE")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            ttl_seconds: env::var("CHALLENGE_TTL_SECONDS")
                .unwrap_or_else(|_| DEFAULT_TTL_SECONDS.to_string())
                .parse()
                .expect("CHALLENGE_TTL_SECONDS must be a number"),
            bind_method_path: env_flag("BIND_METHOD_PATH", true),
            origin_binding: env_flag("ORIGIN_BINDING", false),
            ua_binding: env_flag("UA_BINDING", false),
            clock_skew_seconds: env::var("CLOCK_SKEW_SECONDS")
                .unwrap_or_else(|_| DEFAULT_CLOCK_SKEW_SECONDS.to_string())
                .parse()
                .expect("CLOCK_SKEW_SECONDS must be a number"),
            token_gate_timeout_secs: env::var("TOKEN_GATE_TIMEOUT_SECS")
                .unwrap_or_else(|_| DEFAULT_TOKEN_GATE_TIMEOUT_SECS.to_string())
                .parse()
                .expect("TOKEN_GATE_TIMEOUT_SECS must be a number"),
            replay_capacity: env::var("REPLAY_CAPACITY")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .expect("REPLAY_CAPACITY must be a number"),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a number"),
            cors_origins,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("SHUTDOWN_TIMEOUT_SECS must be a number"),
        }
    }

    /// Builds the protocol configuration around the given replay store.
    pub fn auth_config(&self, replay_store: Arc<dyn ReplayStore>) -> AuthConfig {
        AuthConfig::new(self.issuer.clone(), self.audience.clone())
            .with_ttl_seconds(self.ttl_seconds)
            .with_bind_method_path(self.bind_method_path)
            .with_origin_binding(self.origin_binding)
            .with_ua_binding(self.ua_binding)
            .with_clock_skew_seconds(self.clock_skew_seconds)
            .with_token_gate_timeout_secs(self.token_gate_timeout_secs)
            .with_replay_store(replay_store)
    }
}

/// Reads a boolean flag: "true"/"1" (case-insensitive) enable it.
fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}
