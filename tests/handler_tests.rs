//! Smoke tests for the HTTP handler endpoints.
//!
//! Each handler group (health, experiments, rules) gets at least one test
//! that verifies:
//! - Valid requests return 2xx and well-formed JSON.
//! - The auth middleware rejects unauthenticated access to protected routes.
//!
//! Run with: `cargo test --test handler_tests`

use std::sync::{Arc, Once};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use nudge_engine::{
    config::ServerConfig,
    handlers::{build_protected_routes, build_public_routes, EngineState},
};

// ═══════════════════════════════════════════════════════════════════════
// Test infrastructure
// ═══════════════════════════════════════════════════════════════════════

const TEST_KEY: &str = "handler-smoke-test-key";
static ENV_INIT: Once = Once::new();

fn init_env() {
    ENV_INIT.call_once(|| {
        std::env::set_var("NUDGE_API_KEYS", TEST_KEY);
    });
}

/// Self-contained test harness over fresh in-memory stores.
struct Harness {
    state: Arc<EngineState>,
}

impl Harness {
    fn new() -> Self {
        init_env();
        let state = Arc::new(EngineState::in_memory(ServerConfig::default()));
        Self { state }
    }

    fn app(&self) -> Router {
        // Mirror main.rs: auth middleware only wraps protected routes.
        let public = build_public_routes(self.state.clone());
        let protected = build_protected_routes(self.state.clone()).layer(
            axum::middleware::from_fn(nudge_engine::auth::auth_middleware),
        );
        Router::new().merge(public).merge(protected)
    }
}

// ── request helpers ──

fn authed_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-api-key", TEST_KEY)
        .body(Body::empty())
        .unwrap()
}

fn authed_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    let bytes = serde_json::to_vec(&body).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", TEST_KEY)
        .body(Body::from(bytes))
        .unwrap()
}

fn noauth_get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn noauth_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    let bytes = serde_json::to_vec(&body).unwrap();
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(bytes))
        .unwrap()
}

// ── response helpers ──

async fn status_of(app: Router, req: Request<Body>) -> StatusCode {
    app.oneshot(req).await.unwrap().status()
}

async fn json_of(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let val = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).to_string())
        })
    };
    (status, val)
}

fn experiment_body(id: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "Checkout CTA test",
        "client_app_id": "demo_app",
        "traffic_allocation": 1.0,
        "variants": [
            {"id": "control", "name": "control", "is_control": true},
            {"id": "treatment", "name": "treatment", "configuration": {"cta": "Buy now"}}
        ]
    })
}

// ═══════════════════════════════════════════════════════════════════════
// AUTH MIDDLEWARE
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn auth_public_routes_need_no_key() {
    let h = Harness::new();
    assert_eq!(status_of(h.app(), noauth_get("/health")).await, StatusCode::OK);
    assert_eq!(
        status_of(h.app(), noauth_get("/health/live")).await,
        StatusCode::OK
    );
    assert_eq!(
        status_of(h.app(), noauth_get("/metrics")).await,
        StatusCode::OK
    );
}

#[tokio::test]
async fn auth_protected_routes_reject_missing_key() {
    let h = Harness::new();
    let status = status_of(h.app(), noauth_get("/api/experiments")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let status = status_of(
        h.app(),
        noauth_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "u1"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn auth_bad_key_is_rejected() {
    let h = Harness::new();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/experiments")
        .header("x-api-key", "wrong-key")
        .body(Body::empty())
        .unwrap();
    assert_eq!(status_of(h.app(), req).await, StatusCode::UNAUTHORIZED);
}

// ═══════════════════════════════════════════════════════════════════════
// health.rs
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_endpoint() {
    let h = Harness::new();
    let (status, body) = json_of(h.app(), authed_get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["tests_total"], 0);
}

#[tokio::test]
async fn health_probes() {
    let h = Harness::new();
    let (status, body) = json_of(h.app(), noauth_get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = json_of(h.app(), noauth_get("/health/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

// ═══════════════════════════════════════════════════════════════════════
// experiments.rs
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn experiment_create_validates_control_count() {
    let h = Harness::new();

    // No control variant
    let mut body = experiment_body("exp_bad");
    body["variants"][0]["is_control"] = json!(false);
    let (status, resp) = json_of(h.app(), authed_post("/api/experiments", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "INVALID_TEST_CONFIG");

    // Two controls
    let mut body = experiment_body("exp_bad2");
    body["variants"][1]["is_control"] = json!(true);
    let (status, _) = json_of(h.app(), authed_post("/api/experiments", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn experiment_create_rejects_duplicate_id() {
    let h = Harness::new();
    let (status, _) =
        json_of(h.app(), authed_post("/api/experiments", experiment_body("dup"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, resp) =
        json_of(h.app(), authed_post("/api/experiments", experiment_body("dup"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(resp["code"], "TEST_ALREADY_EXISTS");
}

#[tokio::test]
async fn experiment_assign_requires_running_test() {
    let h = Harness::new();
    let (status, _) =
        json_of(h.app(), authed_post("/api/experiments", experiment_body("draft_exp"))).await;
    assert_eq!(status, StatusCode::OK);

    // Draft test rejects assignment with a structured reason, not an error
    let (status, body) = json_of(
        h.app(),
        authed_post("/api/experiments/draft_exp/assign", json!({"user_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["assigned"], false);
    assert_eq!(body["reason"], "test_not_running");
}

#[tokio::test]
async fn experiment_full_lifecycle() {
    let h = Harness::new();

    let (status, _) = json_of(
        h.app(),
        authed_post("/api/experiments", experiment_body("lifecycle")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = json_of(
        h.app(),
        authed_post("/api/experiments/lifecycle/start", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["test"]["status"], "running");

    // Assignment is sticky across repeated calls
    let (status, first) = json_of(
        h.app(),
        authed_post("/api/experiments/lifecycle/assign", json!({"user_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["assigned"], true);
    assert_eq!(first["fresh"], true);
    assert!(first["variant_id"].is_string());
    assert!(first["variant_name"].is_string());

    let (_, second) = json_of(
        h.app(),
        authed_post("/api/experiments/lifecycle/assign", json!({"user_id": "alice"})),
    )
    .await;
    assert_eq!(second["fresh"], false);
    assert_eq!(second["variant_id"], first["variant_id"]);

    // Conversion for a participant is recorded; a stranger is rejected
    let (status, conv) = json_of(
        h.app(),
        authed_post(
            "/api/experiments/lifecycle/convert",
            json!({"user_id": "alice", "metric_name": "purchase"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conv["recorded"], true);

    let (_, stranger) = json_of(
        h.app(),
        authed_post(
            "/api/experiments/lifecycle/convert",
            json!({"user_id": "nobody", "metric_name": "purchase"}),
        ),
    )
    .await;
    assert_eq!(stranger["recorded"], false);
    assert_eq!(stranger["reason"], "not_a_participant");

    // Analysis report includes both arms
    let (status, report) =
        json_of(h.app(), authed_get("/api/experiments/lifecycle/analyze")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total_participants"], 1);
    assert_eq!(report["variants"].as_array().unwrap().len(), 2);

    // Completion is terminal
    let (status, done) = json_of(
        h.app(),
        authed_post("/api/experiments/lifecycle/complete", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["test"]["status"], "completed");

    let (status, _) = json_of(
        h.app(),
        authed_post("/api/experiments/lifecycle/start", json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn experiment_list_scopes_by_client_app() {
    let h = Harness::new();
    let mut other = experiment_body("other_app_exp");
    other["client_app_id"] = json!("other_app");
    json_of(h.app(), authed_post("/api/experiments", other)).await;
    json_of(h.app(), authed_post("/api/experiments", experiment_body("mine"))).await;

    let (status, body) =
        json_of(h.app(), authed_get("/api/experiments?client_app_id=demo_app")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["tests"][0]["id"], "mine");
}

#[tokio::test]
async fn experiment_missing_test_is_404() {
    let h = Harness::new();
    let (status, body) = json_of(h.app(), authed_get("/api/experiments/ghost/analyze")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TEST_NOT_FOUND");
}

#[tokio::test]
async fn response_bodies_use_the_documented_key_names() {
    // Callers bind to these key names; renaming any of them is a breaking
    // API change. Covers assign, analyze and evaluate.
    let h = Harness::new();
    json_of(h.app(), authed_post("/api/experiments", experiment_body("wire"))).await;
    json_of(h.app(), authed_post("/api/experiments/wire/start", json!({}))).await;

    let (_, assigned) = json_of(
        h.app(),
        authed_post("/api/experiments/wire/assign", json!({"user_id": "dave"})),
    )
    .await;
    for key in ["assigned", "variant_id", "variant_name", "configuration"] {
        assert!(assigned.get(key).is_some(), "missing {key}");
    }
    assert!(assigned.get("variant").is_none(), "variant must not be nested");

    let (_, report) = json_of(h.app(), authed_get("/api/experiments/wire/analyze")).await;
    for key in [
        "test_id",
        "status",
        "total_participants",
        "control",
        "variants",
        "recommendations",
    ] {
        assert!(report.get(key).is_some(), "analyze missing {key}");
    }
    assert!(report.get("report").is_none(), "report must not be wrapped");

    let (_, evaluated) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "dave"}),
        ),
    )
    .await;
    assert!(
        evaluated["triggered_engagements"].is_array(),
        "triggered_engagements must be present even when empty"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// rules.rs
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn rule_create_and_list() {
    let h = Harness::new();
    let (status, body) = json_of(
        h.app(),
        authed_post(
            "/api/rules",
            json!({
                "id": "calm_nudge",
                "client_app_id": "demo_app",
                "name": "Calming nudge",
                "engagement_action": {
                    "template_id": "tpl_calm",
                    "engagement_type": "nudge",
                    "priority": "high",
                    "content_template": "Take a breath."
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rule"]["status"], "active");

    let (status, listed) = json_of(h.app(), authed_get("/api/rules?client_app_id=demo_app")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["count"], 1);
}

#[tokio::test]
async fn rule_evaluation_personalizes_from_profile() {
    let h = Harness::new();

    json_of(
        h.app(),
        authed_post(
            "/api/rules",
            json!({
                "id": "mood_rule",
                "client_app_id": "demo_app",
                "name": "Mood-gated nudge",
                "trigger_conditions": {
                    "psychographic_conditions": [
                        {"field": "emotional_state.mood", "operator": "equals", "value": "anxious"}
                    ]
                },
                "engagement_action": {
                    "template_id": "tpl_mood",
                    "engagement_type": "nudge",
                    "priority": "critical",
                    "content_template": "Feeling {{emotional_state.mood}}? Slow down."
                }
            }),
        ),
    )
    .await;

    // No profile yet: the condition fails closed
    let (status, body) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "bob"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = json_of(
        h.app(),
        authed_post(
            "/api/profiles/bob",
            json!({"emotional_state": {"mood": "anxious"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "bob"}),
        ),
    )
    .await;
    assert_eq!(body["count"], 1);
    assert_eq!(
        body["triggered_engagements"][0]["content"],
        "Feeling anxious? Slow down."
    );
    assert_eq!(body["triggered_engagements"][0]["priority"], "critical");
}

#[tokio::test]
async fn rule_behavioral_conditions_see_tracked_events() {
    let h = Harness::new();

    json_of(
        h.app(),
        authed_post(
            "/api/rules",
            json!({
                "id": "cart_rule",
                "client_app_id": "demo_app",
                "name": "Cart abandonment",
                "trigger_conditions": {
                    "behavioral_conditions": [
                        {"event_type": "cart_add", "frequency": "once"}
                    ]
                },
                "engagement_action": {
                    "template_id": "tpl_cart",
                    "engagement_type": "modal",
                    "priority": "medium",
                    "content_template": "Your cart misses you."
                }
            }),
        ),
    )
    .await;

    let (_, before) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "carol"}),
        ),
    )
    .await;
    assert_eq!(before["count"], 0);

    let (status, _) = json_of(
        h.app(),
        authed_post(
            "/api/events/carol",
            json!({"event_type": "cart_add", "event_payload": {"sku": "A1"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "carol"}),
        ),
    )
    .await;
    assert_eq!(after["count"], 1);
    assert_eq!(after["triggered_engagements"][0]["rule_id"], "cart_rule");
}

#[tokio::test]
async fn invalid_user_id_is_rejected() {
    let h = Harness::new();
    let (status, body) = json_of(
        h.app(),
        authed_post(
            "/api/rules/evaluate",
            json!({"client_app_id": "demo_app", "user_id": "../etc/passwd"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}
