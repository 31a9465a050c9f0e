//! Nudge engine server binary.
//!
//! Wires configuration, metrics, rate limiting and the HTTP router, then
//! serves until a shutdown signal arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use nudge_engine::auth;
use nudge_engine::config::ServerConfig;
use nudge_engine::handlers::{build_protected_routes, build_public_routes, EngineState};
use nudge_engine::metrics;
use nudge_engine::middleware;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    metrics::register_metrics().expect("Failed to register metrics");
    info!("📊 Metrics registered at /metrics");

    info!("🎯 Starting nudge engine server...");

    // Load configuration from environment
    let server_config = ServerConfig::from_env();
    server_config.log();

    let state = Arc::new(EngineState::in_memory(server_config.clone()));

    // Configure rate limiting from config
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(server_config.rate_limit_per_second)
        .burst_size(server_config.rate_limit_burst)
        .finish()
        .expect("Failed to build governor rate limiter configuration");

    let governor_layer = GovernorLayer::new(governor_conf);

    info!(
        "⚡ Rate limiting enabled: {} req/sec, burst of {}",
        server_config.rate_limit_per_second, server_config.rate_limit_burst
    );

    // Build CORS layer from configuration
    let cors = server_config.cors.to_layer();

    // Protected API routes - require authentication and are rate limited
    let protected_routes = build_protected_routes(state.clone())
        .layer(axum::middleware::from_fn(auth::auth_middleware))
        .layer(governor_layer);

    // Public routes - NO rate limiting (health checks, metrics)
    // These must always be accessible for monitoring and Kubernetes probes
    let public_routes = build_public_routes(state.clone());

    let max_concurrent = server_config.max_concurrent_requests;
    info!("🔄 Concurrency limiting enabled: max_concurrent={max_concurrent}");

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server_config.request_timeout_secs,
        )))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", server_config.host, server_config.port).parse()?;
    info!("🚀 Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("👋 Server shutdown complete");

    Ok(())
}

/// Handle graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received, starting graceful shutdown");
}
