//! Core entities: tests, variants, participants, rules, deliveries,
//! profiles, tracked events.
//!
//! Everything here is a plain serde struct; all decision logic lives in the
//! engine modules. Profile traits and event payloads stay as
//! `serde_json::Value` trees so the condition evaluator walks a single
//! representation regardless of how rich a client's profile schema is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// EXPERIMENTS
// =============================================================================

/// Lifecycle of an A/B test: draft -> running -> completed (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Draft,
    Running,
    Completed,
}

/// Statistical settings attached to a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticalSettings {
    /// Confidence level for intervals and significance (0.95 or 0.99)
    pub confidence_level: f64,
    /// Minimum participants per arm before significance is computed
    pub minimum_sample_size: u64,
}

impl Default for StatisticalSettings {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
            minimum_sample_size: 100,
        }
    }
}

/// An A/B test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Test {
    pub id: String,
    pub name: String,
    pub client_app_id: String,
    pub status: TestStatus,
    /// Fraction of users admitted into the experiment, [0, 1]
    pub traffic_allocation: f64,
    pub statistical_settings: StatisticalSettings,
    /// Set on completion when the analysis finds a significant winner
    pub winner_variant_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate metrics tracked per variant (best-effort; the analysis report
/// recomputes from participant records, which are the source of truth)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub participants: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub total_events: u64,
}

/// A variant within a test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub id: String,
    pub test_id: String,
    pub name: String,
    pub is_control: bool,
    /// Relative weight, > 0; weights are normalized at bucketing time
    pub traffic_weight: f64,
    /// Opaque payload handed back to the client on assignment
    #[serde(default)]
    pub configuration: Value,
    #[serde(default)]
    pub performance_metrics: VariantMetrics,
}

/// A conversion event recorded against a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionEvent {
    pub metric_name: String,
    pub event_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Membership of a user in a test. Created on first assignment, immutable
/// in its (test, user, variant) key thereafter; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub test_id: String,
    pub user_id: String,
    pub variant_id: String,
    pub converted: bool,
    pub conversion_events: Vec<ConversionEvent>,
    pub assigned_at: DateTime<Utc>,
}

impl Participant {
    /// Composite store key — the (test_id, user_id) uniqueness contract
    pub fn key_for(test_id: &str, user_id: &str) -> String {
        format!("{test_id}:{user_id}")
    }
}

// =============================================================================
// RULES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    Inactive,
}

/// A single psychographic predicate against the user profile.
///
/// `field` is a dot-path into the profile document, e.g.
/// `"emotional_state.mood"`. Operators are deliberately strings so unknown
/// values deserialize fine and fail closed at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PsychographicCondition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// Sub-condition on an event payload field (equals/contains only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadCondition {
    pub field: String,
    pub operator: String,
    pub value: Value,
}

/// A predicate over the user's recent event window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralCondition {
    pub event_type: String,
    /// "once" (>=1), "multiple" (>=2) or "never" (0)
    pub frequency: String,
    #[serde(default)]
    pub event_payload_conditions: Option<Vec<PayloadCondition>>,
}

/// Elapsed-time thresholds, each measured against an anchor timestamp in the
/// request context. A missing anchor skips that sub-check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConditions {
    #[serde(default)]
    pub idle_time_seconds: Option<i64>,
    #[serde(default)]
    pub time_on_page_seconds: Option<i64>,
    #[serde(default)]
    pub session_duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConditions {
    #[serde(default)]
    pub psychographic_conditions: Vec<PsychographicCondition>,
    #[serde(default)]
    pub behavioral_conditions: Vec<BehavioralCondition>,
    #[serde(default)]
    pub timing_conditions: Option<TimingConditions>,
}

/// Recurrence cap: at most `limit` deliveries per `period` per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxFrequency {
    pub limit: u32,
    /// "hour", "day", "week" or "month"
    pub period: String,
}

/// What happens when a rule fires
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementAction {
    pub template_id: String,
    /// e.g. "nudge", "modal", "compliance_alert"
    pub engagement_type: String,
    /// "critical" > "high" > "medium" > "low"; anything else ranks last
    pub priority: String,
    /// Template text; `{{path}}` placeholders resolve against the profile
    #[serde(default)]
    pub content_template: String,
    #[serde(default)]
    pub style: Value,
    #[serde(default)]
    pub max_frequency: Option<MaxFrequency>,
}

/// Best-effort telemetry on a rule; lost updates under concurrent firing
/// are acceptable
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleAnalytics {
    pub triggered_count: u64,
    pub last_triggered: Option<DateTime<Utc>>,
}

/// A behavioral engagement rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub client_app_id: String,
    pub name: String,
    pub status: RuleStatus,
    pub trigger_conditions: TriggerConditions,
    pub engagement_action: EngagementAction,
    #[serde(default)]
    pub analytics: RuleAnalytics,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
}

/// A firing record: one per successful rule trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub user_id: String,
    pub rule_id: String,
    pub template_id: String,
    pub content: String,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// USER STATE (read-only to the engines)
// =============================================================================

/// Per-user psychographic snapshot. Mutated elsewhere; the engines only read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    /// Five trait scores in [0, 1], keyed by trait name
    #[serde(default)]
    pub personality_traits: Value,
    #[serde(default)]
    pub emotional_state: Value,
    /// "conservative", "moderate" or "aggressive"
    #[serde(default)]
    pub risk_profile: Value,
    #[serde(default)]
    pub cognitive_style: Value,
    #[serde(default)]
    pub motivation_stack: Value,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// The document the psychographic dot-paths resolve against
    pub fn as_document(&self) -> Value {
        serde_json::json!({
            "personality_traits": self.personality_traits,
            "emotional_state": self.emotional_state,
            "risk_profile": self.risk_profile,
            "cognitive_style": self.cognitive_style,
            "motivation_stack": self.motivation_stack,
        })
    }
}

/// A timestamped user event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub id: Uuid,
    pub user_id: String,
    pub event_type: String,
    #[serde(default)]
    pub event_payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Request-time anchors the timing conditions measure against
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationContext {
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page_entered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub session_started_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TestStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&DeliveryStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn test_profile_document_paths() {
        let profile = Profile {
            user_id: "u1".into(),
            personality_traits: serde_json::json!({"openness": 0.8}),
            emotional_state: serde_json::json!({"mood": "anxious"}),
            risk_profile: serde_json::json!("moderate"),
            cognitive_style: Value::Null,
            motivation_stack: Value::Null,
            updated_at: Utc::now(),
        };

        let doc = profile.as_document();
        assert_eq!(doc["emotional_state"]["mood"], "anxious");
        assert_eq!(doc["personality_traits"]["openness"], 0.8);
    }

    #[test]
    fn trigger_conditions_default_empty() {
        let tc: TriggerConditions = serde_json::from_str("{}").unwrap();
        assert!(tc.psychographic_conditions.is_empty());
        assert!(tc.behavioral_conditions.is_empty());
        assert!(tc.timing_conditions.is_none());
    }
}
