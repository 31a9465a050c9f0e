//! Rule evaluation orchestration: frequency gate, condition evaluation,
//! delivery creation, priority ranking.

use std::cmp::Reverse;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::conditions::{
    evaluate_behavioral, evaluate_psychographic, evaluate_timing, resolve_path,
};
use crate::frequency::FrequencyLimiter;
use crate::model::{
    Delivery, DeliveryStatus, EvaluationContext, Profile, Rule, RuleStatus, TrackedEvent,
};
use crate::store::EntityStore;

/// At most this many engagements per evaluation, highest priority first.
/// Policy constant — more than three simultaneous interventions overwhelms
/// a user.
pub const MAX_TRIGGERED_ENGAGEMENTS: usize = 3;

/// Default cap on the recent-event window handed to behavioral conditions
pub const DEFAULT_EVENT_WINDOW: usize = 50;

/// Priority rank used for descending sort; unrecognized strings rank last
pub fn priority_rank(priority: &str) -> u8 {
    match priority {
        "critical" => 4,
        "high" => 3,
        "medium" => 2,
        "low" => 1,
        _ => 0,
    }
}

/// One fired rule, ready to hand to the caller
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredEngagement {
    pub delivery_id: Uuid,
    pub rule_id: String,
    pub rule_name: String,
    pub engagement_type: String,
    pub priority: String,
    pub content: String,
    pub style: Value,
}

/// Seam for content personalization. The default renderer does placeholder
/// substitution; an LLM-backed renderer plugs in here without touching the
/// orchestrator.
pub trait ContentRenderer: Send + Sync {
    fn render(&self, template: &str, profile: Option<&Profile>) -> Result<String>;
}

/// Replaces `{{dot.path}}` placeholders with values from the profile
/// document. Unresolvable placeholders are left verbatim.
pub struct TemplateRenderer;

impl ContentRenderer for TemplateRenderer {
    fn render(&self, template: &str, profile: Option<&Profile>) -> Result<String> {
        let Some(profile) = profile else {
            return Ok(template.to_string());
        };
        let doc = profile.as_document();

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let path = after[..end].trim();
                    match resolve_path(&doc, path) {
                        Some(Value::String(s)) => out.push_str(s),
                        Some(v) => out.push_str(&v.to_string()),
                        None => {
                            out.push_str("{{");
                            out.push_str(&after[..end]);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str("{{");
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

pub struct RuleOrchestrator {
    rules: Arc<dyn EntityStore<Rule>>,
    profiles: Arc<dyn EntityStore<Profile>>,
    events: Arc<dyn EntityStore<TrackedEvent>>,
    deliveries: Arc<dyn EntityStore<Delivery>>,
    limiter: FrequencyLimiter,
    renderer: Arc<dyn ContentRenderer>,
    event_window: usize,
    max_results: usize,
}

impl RuleOrchestrator {
    pub fn new(
        rules: Arc<dyn EntityStore<Rule>>,
        profiles: Arc<dyn EntityStore<Profile>>,
        events: Arc<dyn EntityStore<TrackedEvent>>,
        deliveries: Arc<dyn EntityStore<Delivery>>,
        renderer: Arc<dyn ContentRenderer>,
    ) -> Self {
        let limiter = FrequencyLimiter::new(deliveries.clone());
        Self {
            rules,
            profiles,
            events,
            deliveries,
            limiter,
            renderer,
            event_window: DEFAULT_EVENT_WINDOW,
            max_results: MAX_TRIGGERED_ENGAGEMENTS,
        }
    }

    pub fn with_event_window(mut self, window: usize) -> Self {
        self.event_window = window;
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Evaluate all active rules of `client_app_id` for a user.
    ///
    /// Returns at most `max_results` engagements, sorted descending by
    /// priority rank, stable in rule creation order for ties.
    pub fn evaluate(
        &self,
        client_app_id: &str,
        user_id: &str,
        context: &EvaluationContext,
    ) -> Result<Vec<TriggeredEngagement>> {
        let now = Utc::now();

        let profile = self.profiles.get(user_id)?;
        let profile_doc = profile
            .as_ref()
            .map(|p| p.as_document())
            .unwrap_or(Value::Null);

        // Most-recent-first window of the user's events
        let mut events = self
            .events
            .filter(&|e: &TrackedEvent| e.user_id == user_id, None)?;
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(self.event_window);

        // Creation order is the tie-break order, so make it deterministic
        let mut rules = self.rules.filter(
            &|r: &Rule| r.client_app_id == client_app_id && r.status == RuleStatus::Active,
            None,
        )?;
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut fired: Vec<(u8, usize, TriggeredEngagement)> = Vec::new();

        for (order, rule) in rules.iter().enumerate() {
            let cap = rule.engagement_action.max_frequency.as_ref();
            if !self.limiter.allowed(user_id, &rule.id, cap, now)? {
                tracing::debug!(rule_id = %rule.id, user_id, "frequency capped, skipping");
                continue;
            }

            let conditions = &rule.trigger_conditions;
            let passes = evaluate_psychographic(&profile_doc, &conditions.psychographic_conditions)
                && evaluate_behavioral(&events, &conditions.behavioral_conditions)
                && evaluate_timing(context, conditions.timing_conditions.as_ref(), now);
            if !passes {
                continue;
            }

            let engagement = self.fire(rule, user_id, profile.as_ref(), now)?;
            let rank = priority_rank(&rule.engagement_action.priority);
            fired.push((rank, order, engagement));
        }

        fired.sort_by_key(|(rank, order, _)| (Reverse(*rank), *order));
        Ok(fired
            .into_iter()
            .take(self.max_results)
            .map(|(_, _, e)| e)
            .collect())
    }

    fn fire(
        &self,
        rule: &Rule,
        user_id: &str,
        profile: Option<&Profile>,
        now: chrono::DateTime<Utc>,
    ) -> Result<TriggeredEngagement> {
        let action = &rule.engagement_action;

        // Personalization failure falls back to the raw template — a broken
        // renderer must never suppress an engagement.
        let content = match self.renderer.render(&action.content_template, profile) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(rule_id = %rule.id, %err, "content render failed, using template");
                action.content_template.clone()
            }
        };

        let delivery = self.deliveries.create(Delivery {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            rule_id: rule.id.clone(),
            template_id: action.template_id.clone(),
            content: content.clone(),
            status: DeliveryStatus::Pending,
            created_at: now,
        })?;

        // Best-effort telemetry; a lost update here is acceptable
        if let Err(err) = self.rules.update(&rule.id, &|r| {
            r.analytics.triggered_count += 1;
            r.analytics.last_triggered = Some(now);
        }) {
            tracing::debug!(rule_id = %rule.id, %err, "analytics update failed");
        }

        tracing::info!(
            rule_id = %rule.id,
            user_id,
            priority = %action.priority,
            "rule fired"
        );

        Ok(TriggeredEngagement {
            delivery_id: delivery.id,
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            engagement_type: action.engagement_type.clone(),
            priority: action.priority.clone(),
            content,
            style: action.style.clone(),
        })
    }
}
