//! Generic predicate evaluation over profile, event and timing data.
//!
//! One evaluator serves both the engagement-rule path and compliance
//! monitoring: every condition family is a list with AND semantics (empty
//! list passes vacuously), and every operator dispatch fails closed —
//! an unknown operator or a missing field never fires an action.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::{
    BehavioralCondition, EvaluationContext, PayloadCondition, PsychographicCondition,
    TimingConditions, TrackedEvent,
};

/// Cap on dot-path depth to keep pathological inputs bounded
pub const MAX_PATH_DEPTH: usize = 8;

// =============================================================================
// PATH RESOLUTION
// =============================================================================

/// Walk a dot-path ("emotional_state.mood") into a JSON document.
/// Any missing or non-object intermediate short-circuits to `None`.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for (depth, segment) in path.split('.').enumerate() {
        if depth >= MAX_PATH_DEPTH || segment.is_empty() {
            return None;
        }
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Scalar-to-string view used by the string operators
fn as_comparable_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Numeric view used by greater_than / less_than
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Single operator dispatch. Unknown operators return false — fail closed.
fn check_operator(actual: &Value, operator: &str, expected: &Value) -> bool {
    match operator {
        "equals" => match (as_comparable_string(actual), as_comparable_string(expected)) {
            (Some(a), Some(e)) => a == e,
            _ => false,
        },
        "not_equals" => match (as_comparable_string(actual), as_comparable_string(expected)) {
            (Some(a), Some(e)) => a != e,
            _ => false,
        },
        "greater_than" => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => a > e,
            _ => false,
        },
        "less_than" => match (as_number(actual), as_number(expected)) {
            (Some(a), Some(e)) => a < e,
            _ => false,
        },
        "contains" => match (as_comparable_string(actual), as_comparable_string(expected)) {
            (Some(a), Some(e)) => a.to_lowercase().contains(&e.to_lowercase()),
            _ => false,
        },
        "not_contains" => match (as_comparable_string(actual), as_comparable_string(expected)) {
            (Some(a), Some(e)) => !a.to_lowercase().contains(&e.to_lowercase()),
            _ => false,
        },
        _ => false,
    }
}

// =============================================================================
// CONDITION FAMILIES
// =============================================================================

/// All psychographic conditions must pass against the profile document.
/// A missing field fails its condition regardless of operator.
pub fn evaluate_psychographic(profile: &Value, conditions: &[PsychographicCondition]) -> bool {
    conditions.iter().all(|cond| {
        match resolve_path(profile, &cond.field) {
            Some(actual) => check_operator(actual, &cond.operator, &cond.value),
            None => false,
        }
    })
}

fn payload_matches(payload: &Value, conditions: &[PayloadCondition]) -> bool {
    conditions.iter().all(|cond| {
        let actual = match payload.as_object().and_then(|o| o.get(&cond.field)) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };
        match cond.operator.as_str() {
            // Payload sub-conditions support equals/contains only
            "equals" | "contains" => check_operator(actual, &cond.operator, &cond.value),
            _ => false,
        }
    })
}

/// All behavioral conditions must pass against the recent event window.
/// once => at least 1 matching event, multiple => at least 2, never => 0.
pub fn evaluate_behavioral(events: &[TrackedEvent], conditions: &[BehavioralCondition]) -> bool {
    conditions.iter().all(|cond| {
        let matching = events
            .iter()
            .filter(|e| e.event_type == cond.event_type)
            .filter(|e| match &cond.event_payload_conditions {
                Some(payload_conds) => payload_matches(&e.event_payload, payload_conds),
                None => true,
            })
            .count();

        match cond.frequency.as_str() {
            "once" => matching >= 1,
            "multiple" => matching >= 2,
            "never" => matching == 0,
            _ => false,
        }
    })
}

/// Timing thresholds against context anchors. A threshold with no anchor in
/// the context is skipped (not failed) — the caller simply did not report
/// that clock.
pub fn evaluate_timing(
    context: &EvaluationContext,
    timing: Option<&TimingConditions>,
    now: DateTime<Utc>,
) -> bool {
    let Some(timing) = timing else {
        return true;
    };

    let checks = [
        (timing.idle_time_seconds, context.last_activity_at),
        (timing.time_on_page_seconds, context.page_entered_at),
        (timing.session_duration_seconds, context.session_started_at),
    ];

    checks.iter().all(|(threshold, anchor)| {
        match (threshold, anchor) {
            (Some(min_secs), Some(anchor)) => (now - *anchor).num_seconds() >= *min_secs,
            // No threshold, or threshold without an anchor: skipped
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    fn psych(field: &str, operator: &str, value: Value) -> PsychographicCondition {
        PsychographicCondition {
            field: field.into(),
            operator: operator.into(),
            value,
        }
    }

    fn event(event_type: &str, payload: Value) -> TrackedEvent {
        TrackedEvent {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            event_type: event_type.into(),
            event_payload: payload,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn resolve_path_walks_nested_objects() {
        let doc = json!({"emotional_state": {"mood": "anxious"}});
        assert_eq!(
            resolve_path(&doc, "emotional_state.mood").unwrap(),
            &json!("anxious")
        );
        assert!(resolve_path(&doc, "emotional_state.energy").is_none());
        assert!(resolve_path(&doc, "missing.mood").is_none());
    }

    #[test]
    fn resolve_path_depth_capped() {
        let deep = "a.".repeat(MAX_PATH_DEPTH + 2) + "z";
        assert!(resolve_path(&json!({"a": 1}), &deep).is_none());
    }

    #[test]
    fn equals_and_not_equals() {
        let profile = json!({"emotional_state": {"mood": "anxious"}});
        assert!(evaluate_psychographic(
            &profile,
            &[psych("emotional_state.mood", "equals", json!("anxious"))]
        ));
        assert!(!evaluate_psychographic(
            &profile,
            &[psych("emotional_state.mood", "not_equals", json!("anxious"))]
        ));
    }

    #[test]
    fn missing_field_fails_every_operator() {
        let profile = json!({"emotional_state": {"mood": "anxious"}});
        for op in ["equals", "not_equals", "greater_than", "contains", "not_contains"] {
            assert!(
                !evaluate_psychographic(
                    &profile,
                    &[psych("emotional_state.energy", op, json!("x"))]
                ),
                "operator {op} should fail on missing field"
            );
        }
    }

    #[test]
    fn numeric_operators_parse_strings() {
        let profile = json!({"personality_traits": {"openness": "0.8"}});
        assert!(evaluate_psychographic(
            &profile,
            &[psych("personality_traits.openness", "greater_than", json!(0.5))]
        ));
        assert!(!evaluate_psychographic(
            &profile,
            &[psych("personality_traits.openness", "less_than", json!(0.5))]
        ));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let profile = json!({"motivation_stack": {"primary": "Status-Seeking"}});
        assert!(evaluate_psychographic(
            &profile,
            &[psych("motivation_stack.primary", "contains", json!("status"))]
        ));
        assert!(!evaluate_psychographic(
            &profile,
            &[psych("motivation_stack.primary", "not_contains", json!("STATUS"))]
        ));
    }

    #[test]
    fn unknown_operator_fails_closed() {
        let profile = json!({"risk_profile": "aggressive"});
        assert!(!evaluate_psychographic(
            &profile,
            &[psych("risk_profile", "matches_regex", json!(".*"))]
        ));
    }

    #[test]
    fn empty_condition_lists_pass() {
        assert!(evaluate_psychographic(&json!({}), &[]));
        assert!(evaluate_behavioral(&[], &[]));
        assert!(evaluate_timing(&EvaluationContext::default(), None, Utc::now()));
    }

    #[test]
    fn behavioral_cardinalities() {
        let events = vec![
            event("page_view", json!({"page": "pricing"})),
            event("page_view", json!({"page": "docs"})),
            event("checkout", json!({})),
        ];

        let cond = |freq: &str, ty: &str| BehavioralCondition {
            event_type: ty.into(),
            frequency: freq.into(),
            event_payload_conditions: None,
        };

        assert!(evaluate_behavioral(&events, &[cond("once", "checkout")]));
        assert!(evaluate_behavioral(&events, &[cond("multiple", "page_view")]));
        assert!(!evaluate_behavioral(&events, &[cond("multiple", "checkout")]));
        assert!(evaluate_behavioral(&events, &[cond("never", "signup")]));
        assert!(!evaluate_behavioral(&events, &[cond("never", "checkout")]));
        // Unknown frequency fails closed
        assert!(!evaluate_behavioral(&events, &[cond("sometimes", "checkout")]));
    }

    #[test]
    fn behavioral_payload_subconditions() {
        let events = vec![
            event("page_view", json!({"page": "pricing"})),
            event("page_view", json!({"page": "docs"})),
        ];

        let cond = BehavioralCondition {
            event_type: "page_view".into(),
            frequency: "multiple".into(),
            event_payload_conditions: Some(vec![PayloadCondition {
                field: "page".into(),
                operator: "equals".into(),
                value: json!("pricing"),
            }]),
        };
        // Only one event matches the payload filter, so "multiple" fails
        assert!(!evaluate_behavioral(&events, &[cond.clone()]));

        let once = BehavioralCondition {
            frequency: "once".into(),
            ..cond
        };
        assert!(evaluate_behavioral(&events, &[once]));
    }

    #[test]
    fn timing_thresholds_and_missing_anchors() {
        let now = Utc::now();
        let timing = TimingConditions {
            idle_time_seconds: Some(60),
            time_on_page_seconds: Some(30),
            session_duration_seconds: None,
        };

        let ctx = EvaluationContext {
            last_activity_at: Some(now - Duration::seconds(120)),
            page_entered_at: Some(now - Duration::seconds(10)),
            session_started_at: None,
        };
        // time_on_page threshold not met
        assert!(!evaluate_timing(&ctx, Some(&timing), now));

        let ctx = EvaluationContext {
            last_activity_at: Some(now - Duration::seconds(120)),
            // Missing anchor: the time_on_page sub-check is skipped
            page_entered_at: None,
            session_started_at: None,
        };
        assert!(evaluate_timing(&ctx, Some(&timing), now));
    }
}
