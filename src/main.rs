//! OpenKitx403 demo server
//!
//! Main entry point for the demo API with:
//! - Wallet-gated routes under /api/v1
//! - Health endpoint at root level
//! - Request ID middleware for traceability
//! - Request logging with structured output
//! - CORS configuration for development
//! - Graceful shutdown handling

use axum::http::{header, HeaderName, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use uuid::Uuid;

use openkitx403::config::AppConfig;
use openkitx403::routes::{self, AppState};
use openkitx403::services::InMemoryReplayStore;

/// Request ID header name
const X_REQUEST_ID: &str = "x-request-id";

#[tokio::main]
async fn main() {
    // Load configuration first
    let config = AppConfig::load();

    // Initialize tracing with format based on config
    init_tracing(&config.log_format);

    tracing::info!("Starting OpenKitx403 demo server");

    // Replay store with background sweeping of expired nonces
    let replay_store = Arc::new(InMemoryReplayStore::new(config.replay_capacity));
    let _sweeper_handle = InMemoryReplayStore::spawn_sweeper(replay_store.clone());
    tracing::info!(capacity = config.replay_capacity, "Replay store initialized");

    // Build CORS layer
    let cors = build_cors_layer(&config.cors_origins);

    // Request ID header
    let x_request_id = HeaderName::from_static(X_REQUEST_ID);

    // Build the application state with the immutable protocol config
    let app_state = AppState {
        auth: Arc::new(config.auth_config(replay_store)),
    };
    tracing::info!(config = ?app_state.auth, "Protocol configuration loaded");

    // Build the router with middleware stack
    let app = routes::api_router(app_state).layer(
        ServiceBuilder::new()
            // Set request ID on incoming requests
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            // Propagate request ID to response headers
            .layer(PropagateRequestIdLayer::new(x_request_id))
            // Add tracing with request ID in spans
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &axum::http::Request<_>| {
                        let request_id = request
                            .headers()
                            .get(X_REQUEST_ID)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| Uuid::parse_str(s).ok())
                            .unwrap_or_else(Uuid::new_v4);

                        tracing::info_span!(
                            "http_request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    })
                    .on_response(
                        |response: &axum::http::Response<_>, latency: Duration, _span: &Span| {
                            tracing::info!(
                                status = %response.status().as_u16(),
                                latency_ms = %latency.as_millis(),
                                "request completed"
                            );
                        },
                    ),
            )
            // CORS layer
            .layer(cors),
    );

    // Run the server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid host:port combination");
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout_secs))
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

/// Wires the tracing subscriber: JSON output when configured, otherwise a
/// human-readable formatter for local development. `RUST_LOG` overrides the
/// default filter, which keeps the auth path at debug so rejection codes
/// show up without extra flags.
fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,openkitx403=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if log_format == "json" {
        registry
            .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
            .init();
    } else {
        registry
            .with(fmt::layer().with_span_events(FmtSpan::CLOSE))
            .init();
    }
}

/// Build CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let allow_headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::ACCEPT,
        HeaderName::from_static(X_REQUEST_ID),
    ];

    if origins.is_empty() {
        tracing::warn!("No CORS origins configured, allowing any origin");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(allow_methods)
            .allow_headers(allow_headers)
    } else {
        let allowed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(allowed_origins)
            .allow_methods(allow_methods)
            .allow_headers(allow_headers)
    }
}

/// Resolves once the process is asked to stop, via SIGINT or SIGTERM.
///
/// `axum::serve` drains in-flight requests after this future completes;
/// `timeout_secs` is advisory and only logged.
async fn shutdown_signal(timeout_secs: u64) {
    let interrupt = async {
        signal::ctrl_c().await.expect("SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let signal_name = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };

    tracing::info!(
        signal = signal_name,
        timeout_secs,
        "shutdown requested, draining in-flight requests"
    );
}
