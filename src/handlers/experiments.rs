//! Experiment Handlers
//!
//! Test lifecycle management, variant assignment, conversion recording
//! and statistical analysis.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::state::AppState;
use crate::analysis::ReportBuilder;
use crate::assignment::AssignmentOutcome;
use crate::errors::{AppError, Result, ValidationErrorExt};
use crate::metrics;
use crate::model::{StatisticalSettings, Test, TestStatus, Variant, VariantMetrics};
use crate::validation;

fn default_traffic_allocation() -> f64 {
    1.0
}

fn default_traffic_weight() -> f64 {
    1.0
}

/// Variant definition inside a create request
#[derive(Debug, Deserialize)]
pub struct VariantSpec {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_control: bool,
    #[serde(default = "default_traffic_weight")]
    pub traffic_weight: f64,
    #[serde(default)]
    pub configuration: Value,
}

/// Request to create a new experiment
#[derive(Debug, Deserialize)]
pub struct CreateExperimentRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub client_app_id: String,
    #[serde(default = "default_traffic_allocation")]
    pub traffic_allocation: f64,
    #[serde(default)]
    pub statistical_settings: Option<StatisticalSettings>,
    pub variants: Vec<VariantSpec>,
}

#[derive(Debug, Deserialize)]
pub struct ListExperimentsQuery {
    #[serde(default)]
    pub client_app_id: Option<String>,
}

/// Request body for variant assignment
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub user_id: String,
}

fn default_event_type() -> String {
    "conversion".to_string()
}

fn default_value() -> f64 {
    1.0
}

/// Request body for conversion recording
#[derive(Debug, Deserialize)]
pub struct ConvertRequest {
    pub user_id: String,
    pub metric_name: String,
    #[serde(default = "default_event_type")]
    pub event_type: String,
    #[serde(default = "default_value")]
    pub value: f64,
}

fn test_summary(test: &Test) -> Value {
    serde_json::json!({
        "id": test.id,
        "name": test.name,
        "client_app_id": test.client_app_id,
        "status": test.status,
        "traffic_allocation": test.traffic_allocation,
        "winner_variant_id": test.winner_variant_id,
        "created_at": test.created_at.to_rfc3339(),
        "started_at": test.started_at.map(|t| t.to_rfc3339()),
        "completed_at": test.completed_at.map(|t| t.to_rfc3339()),
    })
}

fn load_test(state: &AppState, test_id: &str) -> Result<Test> {
    state
        .tests
        .get(test_id)?
        .ok_or_else(|| AppError::TestNotFound(test_id.to_string()))
}

fn load_variants(state: &AppState, test_id: &str) -> Result<Vec<Variant>> {
    let owner = test_id.to_string();
    let mut variants = state
        .variants
        .filter(&move |v: &Variant| v.test_id == owner, None)?;
    variants.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(variants)
}

/// POST /api/experiments - Create a new experiment with its variants
pub async fn create_experiment(
    State(state): State<AppState>,
    Json(req): Json<CreateExperimentRequest>,
) -> Result<Json<Value>> {
    validation::validate_name(&req.name).map_validation_err("name")?;
    validation::validate_entity_id(&req.client_app_id).map_validation_err("client_app_id")?;
    validation::validate_traffic_allocation(req.traffic_allocation)
        .map_validation_err("traffic_allocation")?;

    if let Some(id) = &req.id {
        validation::validate_entity_id(id).map_validation_err("id")?;
    }

    if req.variants.len() < 2 {
        return Err(AppError::InvalidTestConfig(
            "an experiment needs at least two variants".to_string(),
        ));
    }

    let controls = req.variants.iter().filter(|v| v.is_control).count();
    if controls != 1 {
        return Err(AppError::InvalidTestConfig(format!(
            "exactly one control variant required, got {controls}"
        )));
    }

    for spec in &req.variants {
        validation::validate_name(&spec.name).map_validation_err("variants.name")?;
        validation::validate_traffic_weight(spec.traffic_weight)
            .map_validation_err("variants.traffic_weight")?;
        if let Some(id) = &spec.id {
            validation::validate_entity_id(id).map_validation_err("variants.id")?;
        }
    }

    let settings = req.statistical_settings.unwrap_or_default();
    validation::validate_confidence_level(settings.confidence_level)
        .map_validation_err("statistical_settings.confidence_level")?;

    let test_id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if state.tests.get(&test_id)?.is_some() {
        return Err(AppError::TestAlreadyExists(test_id));
    }

    let test = state.tests.create(Test {
        id: test_id.clone(),
        name: req.name,
        client_app_id: req.client_app_id,
        status: TestStatus::Draft,
        traffic_allocation: req.traffic_allocation,
        statistical_settings: settings,
        winner_variant_id: None,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
    })?;

    let mut variant_ids = Vec::with_capacity(req.variants.len());
    for spec in req.variants {
        let variant = state.variants.create(Variant {
            id: spec.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            test_id: test_id.clone(),
            name: spec.name,
            is_control: spec.is_control,
            traffic_weight: spec.traffic_weight,
            configuration: spec.configuration,
            performance_metrics: VariantMetrics::default(),
        })?;
        variant_ids.push(variant.id);
    }

    tracing::info!(test_id = %test.id, variants = variant_ids.len(), "experiment created");

    Ok(Json(serde_json::json!({
        "success": true,
        "test": test_summary(&test),
        "variant_ids": variant_ids,
    })))
}

/// GET /api/experiments - List experiments, optionally scoped to a client app
pub async fn list_experiments(
    State(state): State<AppState>,
    Query(query): Query<ListExperimentsQuery>,
) -> Result<Json<Value>> {
    let mut tests = state.tests.filter(
        &move |t: &Test| match &query.client_app_id {
            Some(app) => &t.client_app_id == app,
            None => true,
        },
        None,
    )?;
    tests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut summaries = Vec::with_capacity(tests.len());
    for test in &tests {
        let owner = test.id.clone();
        let participants = state
            .participants
            .filter(&move |p: &crate::model::Participant| p.test_id == owner, None)?
            .len();
        let mut summary = test_summary(test);
        summary["participants"] = serde_json::json!(participants);
        summaries.push(summary);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "count": tests.len(),
        "tests": summaries,
    })))
}

/// GET /api/experiments/{test_id} - Fetch one experiment with its variants
pub async fn get_experiment(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<Value>> {
    let test = load_test(&state, &test_id)?;
    let variants = load_variants(&state, &test_id)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "test": test_summary(&test),
        "variants": variants,
    })))
}

/// POST /api/experiments/{test_id}/start - Transition draft -> running
pub async fn start_experiment(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<Value>> {
    let test = load_test(&state, &test_id)?;
    if test.status != TestStatus::Draft {
        return Err(AppError::InvalidTestConfig(format!(
            "test '{test_id}' cannot start from status {:?}",
            test.status
        )));
    }

    let updated = state
        .tests
        .update(&test_id, &|t| {
            t.status = TestStatus::Running;
            t.started_at = Some(Utc::now());
        })?
        .ok_or_else(|| AppError::TestNotFound(test_id.clone()))?;

    tracing::info!(test_id = %test_id, "experiment started");

    Ok(Json(serde_json::json!({
        "success": true,
        "test": test_summary(&updated),
    })))
}

/// POST /api/experiments/{test_id}/complete - Transition running -> completed
///
/// Completion is terminal. The winner, if any arm is significantly better
/// than control, is recorded on the test.
pub async fn complete_experiment(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<Value>> {
    let test = load_test(&state, &test_id)?;
    if test.status != TestStatus::Running {
        return Err(AppError::InvalidTestConfig(format!(
            "test '{test_id}' cannot complete from status {:?}",
            test.status
        )));
    }

    let report = state.reports.analyze(&test)?;
    let winner = ReportBuilder::pick_winner(&report);

    let winner_for_update = winner.clone();
    let updated = state
        .tests
        .update(&test_id, &move |t| {
            t.status = TestStatus::Completed;
            t.completed_at = Some(Utc::now());
            t.winner_variant_id = winner_for_update.clone();
        })?
        .ok_or_else(|| AppError::TestNotFound(test_id.clone()))?;

    tracing::info!(test_id = %test_id, winner = ?winner, "experiment completed");

    Ok(Json(serde_json::json!({
        "success": true,
        "test": test_summary(&updated),
        "winner_variant_id": winner,
        "report": report,
    })))
}

/// POST /api/experiments/{test_id}/assign - Deterministic variant assignment
pub async fn assign_variant(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Value>> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;

    let _timer = metrics::Timer::new(metrics::ASSIGNMENT_DURATION.clone());
    let test = load_test(&state, &test_id)?;
    let variants = load_variants(&state, &test_id)?;

    match state.assignment.assign(&test, &variants, &req.user_id)? {
        AssignmentOutcome::Assigned { variant, fresh } => {
            metrics::ASSIGNMENTS_TOTAL
                .with_label_values(&[if fresh { "assigned" } else { "existing" }])
                .inc();

            Ok(Json(serde_json::json!({
                "assigned": true,
                "fresh": fresh,
                "test_id": test_id,
                "user_id": req.user_id,
                "variant_id": variant.id,
                "variant_name": variant.name,
                "is_control": variant.is_control,
                "configuration": variant.configuration,
            })))
        }
        AssignmentOutcome::Rejected(reason) => {
            metrics::ASSIGNMENTS_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();

            Ok(Json(serde_json::json!({
                "assigned": false,
                "test_id": test_id,
                "user_id": req.user_id,
                "reason": reason,
            })))
        }
    }
}

/// POST /api/experiments/{test_id}/convert - Record a conversion
pub async fn record_conversion(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
    Json(req): Json<ConvertRequest>,
) -> Result<Json<Value>> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;
    validation::validate_name(&req.metric_name).map_validation_err("metric_name")?;

    let test = load_test(&state, &test_id)?;

    match state.assignment.record_conversion(
        &test,
        &req.user_id,
        &req.metric_name,
        &req.event_type,
        req.value,
    ) {
        Ok(None) => {
            metrics::CONVERSIONS_TOTAL
                .with_label_values(&["recorded"])
                .inc();
            Ok(Json(serde_json::json!({
                "recorded": true,
                "test_id": test_id,
                "user_id": req.user_id,
                "metric_name": req.metric_name,
            })))
        }
        Ok(Some(reason)) => {
            metrics::CONVERSIONS_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
            Ok(Json(serde_json::json!({
                "recorded": false,
                "test_id": test_id,
                "user_id": req.user_id,
                "reason": reason,
            })))
        }
        Err(e) => {
            metrics::CONVERSIONS_TOTAL.with_label_values(&["error"]).inc();
            Err(e.into())
        }
    }
}

/// GET /api/experiments/{test_id}/analyze - Full statistical report
pub async fn analyze_experiment(
    State(state): State<AppState>,
    Path(test_id): Path<String>,
) -> Result<Json<Value>> {
    let test = load_test(&state, &test_id)?;

    match state.reports.analyze(&test) {
        Ok(report) => {
            metrics::ANALYSIS_TOTAL.with_label_values(&["ok"]).inc();
            // The report IS the response body: test_id, status,
            // total_participants, control, variants, recommendations.
            let mut body = serde_json::to_value(&report)
                .map_err(|e| AppError::SerializationError(e.to_string()))?;
            body["success"] = serde_json::json!(true);
            Ok(Json(body))
        }
        Err(e) => {
            metrics::ANALYSIS_TOTAL.with_label_values(&["error"]).inc();
            Err(e.into())
        }
    }
}
