//! Behavioral Rule Handlers
//!
//! Rule management, evaluation, profile upserts and event tracking.

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::state::AppState;
use crate::errors::{AppError, Result, ValidationErrorExt};
use crate::metrics;
use crate::model::{
    EngagementAction, EvaluationContext, Profile, Rule, RuleAnalytics, RuleStatus, TrackedEvent,
    TriggerConditions,
};
use crate::validation;

/// Request to create a behavioral rule
#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub client_app_id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<RuleStatus>,
    #[serde(default)]
    pub trigger_conditions: TriggerConditions,
    pub engagement_action: EngagementAction,
}

#[derive(Debug, Deserialize)]
pub struct ListRulesQuery {
    #[serde(default)]
    pub client_app_id: Option<String>,
}

/// Request to evaluate all active rules for a user
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub client_app_id: String,
    pub user_id: String,
    #[serde(default)]
    pub context: EvaluationContext,
}

/// Profile upsert body; absent fields keep their stored value
#[derive(Debug, Deserialize)]
pub struct UpsertProfileRequest {
    #[serde(default)]
    pub personality_traits: Option<Value>,
    #[serde(default)]
    pub emotional_state: Option<Value>,
    #[serde(default)]
    pub risk_profile: Option<Value>,
    #[serde(default)]
    pub cognitive_style: Option<Value>,
    #[serde(default)]
    pub motivation_stack: Option<Value>,
}

/// Event tracking body
#[derive(Debug, Deserialize)]
pub struct RecordEventRequest {
    pub event_type: String,
    #[serde(default)]
    pub event_payload: Value,
}

fn rule_summary(rule: &Rule) -> Value {
    serde_json::json!({
        "id": rule.id,
        "client_app_id": rule.client_app_id,
        "name": rule.name,
        "status": rule.status,
        "priority": rule.engagement_action.priority,
        "engagement_type": rule.engagement_action.engagement_type,
        "triggered_count": rule.analytics.triggered_count,
        "last_triggered": rule.analytics.last_triggered.map(|t| t.to_rfc3339()),
        "created_at": rule.created_at.to_rfc3339(),
    })
}

/// POST /api/rules - Create a behavioral rule
pub async fn create_rule(
    State(state): State<AppState>,
    Json(req): Json<CreateRuleRequest>,
) -> Result<Json<Value>> {
    validation::validate_name(&req.name).map_validation_err("name")?;
    validation::validate_entity_id(&req.client_app_id).map_validation_err("client_app_id")?;
    validation::validate_template(&req.engagement_action.content_template)
        .map_validation_err("engagement_action.content_template")?;

    if let Some(id) = &req.id {
        validation::validate_entity_id(id).map_validation_err("id")?;
    }

    let condition_count = req.trigger_conditions.psychographic_conditions.len()
        + req.trigger_conditions.behavioral_conditions.len();
    if condition_count > validation::MAX_CONDITIONS_PER_RULE {
        return Err(AppError::InvalidRuleConfig(format!(
            "too many conditions: {condition_count} (max: {})",
            validation::MAX_CONDITIONS_PER_RULE
        )));
    }

    let rule_id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    if state.rules.get(&rule_id)?.is_some() {
        return Err(AppError::InvalidRuleConfig(format!(
            "rule already exists: {rule_id}"
        )));
    }

    let rule = state.rules.create(Rule {
        id: rule_id,
        client_app_id: req.client_app_id,
        name: req.name,
        status: req.status.unwrap_or(RuleStatus::Active),
        trigger_conditions: req.trigger_conditions,
        engagement_action: req.engagement_action,
        analytics: RuleAnalytics::default(),
        created_at: Utc::now(),
    })?;

    tracing::info!(rule_id = %rule.id, "rule created");

    Ok(Json(serde_json::json!({
        "success": true,
        "rule": rule_summary(&rule),
    })))
}

/// GET /api/rules - List rules, optionally scoped to a client app
pub async fn list_rules(
    State(state): State<AppState>,
    Query(query): Query<ListRulesQuery>,
) -> Result<Json<Value>> {
    let mut rules = state.rules.filter(
        &move |r: &Rule| match &query.client_app_id {
            Some(app) => &r.client_app_id == app,
            None => true,
        },
        None,
    )?;
    rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    Ok(Json(serde_json::json!({
        "success": true,
        "count": rules.len(),
        "rules": rules.iter().map(rule_summary).collect::<Vec<_>>(),
    })))
}

/// POST /api/rules/evaluate - Run all active rules for a user
pub async fn evaluate_rules(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<Value>> {
    validation::validate_user_id(&req.user_id).map_validation_err("user_id")?;
    validation::validate_entity_id(&req.client_app_id).map_validation_err("client_app_id")?;

    let _timer = metrics::Timer::new(metrics::RULE_EVALUATION_DURATION.clone());
    match state
        .orchestrator
        .evaluate(&req.client_app_id, &req.user_id, &req.context)
    {
        Ok(engagements) => {
            metrics::RULE_EVALUATIONS_TOTAL
                .with_label_values(&["ok"])
                .inc();
            for engagement in &engagements {
                metrics::RULES_FIRED_TOTAL
                    .with_label_values(&[engagement.priority.as_str()])
                    .inc();
            }

            Ok(Json(serde_json::json!({
                "success": true,
                "user_id": req.user_id,
                "count": engagements.len(),
                "triggered_engagements": engagements,
            })))
        }
        Err(e) => {
            metrics::RULE_EVALUATIONS_TOTAL
                .with_label_values(&["error"])
                .inc();
            Err(e.into())
        }
    }
}

/// POST /api/profiles/{user_id} - Create or update a psychographic profile
pub async fn upsert_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<UpsertProfileRequest>,
) -> Result<Json<Value>> {
    validation::validate_user_id(&user_id).map_validation_err("user_id")?;

    let now = Utc::now();
    let profile = if state.profiles.get(&user_id)?.is_some() {
        state
            .profiles
            .update(&user_id, &|p: &mut Profile| {
                if let Some(v) = &req.personality_traits {
                    p.personality_traits = v.clone();
                }
                if let Some(v) = &req.emotional_state {
                    p.emotional_state = v.clone();
                }
                if let Some(v) = &req.risk_profile {
                    p.risk_profile = v.clone();
                }
                if let Some(v) = &req.cognitive_style {
                    p.cognitive_style = v.clone();
                }
                if let Some(v) = &req.motivation_stack {
                    p.motivation_stack = v.clone();
                }
                p.updated_at = now;
            })?
            .ok_or_else(|| AppError::StoreError(format!("profile vanished: {user_id}")))?
    } else {
        state.profiles.create(Profile {
            user_id: user_id.clone(),
            personality_traits: req.personality_traits.unwrap_or(Value::Null),
            emotional_state: req.emotional_state.unwrap_or(Value::Null),
            risk_profile: req.risk_profile.unwrap_or(Value::Null),
            cognitive_style: req.cognitive_style.unwrap_or(Value::Null),
            motivation_stack: req.motivation_stack.unwrap_or(Value::Null),
            updated_at: now,
        })?
    };

    Ok(Json(serde_json::json!({
        "success": true,
        "profile": profile,
    })))
}

/// POST /api/events/{user_id} - Track a behavioral event
pub async fn record_event(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<RecordEventRequest>,
) -> Result<Json<Value>> {
    validation::validate_user_id(&user_id).map_validation_err("user_id")?;
    validation::validate_name(&req.event_type).map_validation_err("event_type")?;

    let event = state.events.create(TrackedEvent {
        id: Uuid::new_v4(),
        user_id,
        event_type: req.event_type,
        event_payload: req.event_payload,
        timestamp: Utc::now(),
    })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "event_id": event.id,
        "timestamp": event.timestamp.to_rfc3339(),
    })))
}
