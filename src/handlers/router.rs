//! Router Configuration - Centralized route definitions
//!
//! Routes are organized by domain and split into public (no auth) and
//! protected (auth required).

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;
use super::{experiments, health, rules};

/// Build the public routes (no authentication required)
///
/// These routes must always be accessible for:
/// - Health checks (Kubernetes probes)
/// - Metrics (Prometheus scraping)
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the protected API routes (authentication required)
///
/// These routes require API key authentication and are rate-limited.
/// The auth middleware and rate limiter should be applied by the caller.
pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // EXPERIMENTS
        // =================================================================
        .route("/api/experiments", post(experiments::create_experiment))
        .route("/api/experiments", get(experiments::list_experiments))
        .route(
            "/api/experiments/{test_id}",
            get(experiments::get_experiment),
        )
        .route(
            "/api/experiments/{test_id}/start",
            post(experiments::start_experiment),
        )
        .route(
            "/api/experiments/{test_id}/complete",
            post(experiments::complete_experiment),
        )
        .route(
            "/api/experiments/{test_id}/assign",
            post(experiments::assign_variant),
        )
        .route(
            "/api/experiments/{test_id}/convert",
            post(experiments::record_conversion),
        )
        .route(
            "/api/experiments/{test_id}/analyze",
            get(experiments::analyze_experiment),
        )
        // =================================================================
        // BEHAVIORAL RULES
        // =================================================================
        .route("/api/rules", post(rules::create_rule))
        .route("/api/rules", get(rules::list_rules))
        .route("/api/rules/evaluate", post(rules::evaluate_rules))
        // =================================================================
        // PROFILES & EVENTS
        // =================================================================
        .route("/api/profiles/{user_id}", post(rules::upsert_profile))
        .route("/api/events/{user_id}", post(rules::record_event))
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the complete router with both public and protected routes
///
/// Note: This function does NOT apply auth middleware or rate limiting.
/// The caller (main.rs) should apply those layers as needed.
pub fn build_router(state: AppState) -> Router {
    let public = build_public_routes(state.clone());
    let protected = build_protected_routes(state);

    Router::new().merge(public).merge(protected)
}
