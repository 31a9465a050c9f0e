//! Application state: entity stores plus the engines wired on top of them.
//!
//! Handlers reach the engines through this struct only. Stores are held as
//! trait objects so the in-memory backing can be swapped for a database
//! without touching any handler.

use std::sync::Arc;

use crate::analysis::ReportBuilder;
use crate::assignment::AssignmentEngine;
use crate::config::ServerConfig;
use crate::model::{Delivery, Participant, Profile, Rule, Test, TrackedEvent, Variant};
use crate::rules::{RuleOrchestrator, TemplateRenderer};
use crate::store::{EntityStore, MemStore, ParticipantStore};

/// Application state type alias
pub type AppState = Arc<EngineState>;

pub struct EngineState {
    config: ServerConfig,

    pub tests: Arc<dyn EntityStore<Test>>,
    pub variants: Arc<dyn EntityStore<Variant>>,
    pub participants: Arc<dyn ParticipantStore>,
    pub rules: Arc<dyn EntityStore<Rule>>,
    pub profiles: Arc<dyn EntityStore<Profile>>,
    pub events: Arc<dyn EntityStore<TrackedEvent>>,
    pub deliveries: Arc<dyn EntityStore<Delivery>>,

    pub assignment: AssignmentEngine,
    pub orchestrator: RuleOrchestrator,
    pub reports: ReportBuilder,
}

impl EngineState {
    /// Wire up the engines over fresh in-memory stores
    pub fn in_memory(config: ServerConfig) -> Self {
        let tests: Arc<dyn EntityStore<Test>> = Arc::new(MemStore::new());
        let variants: Arc<dyn EntityStore<Variant>> = Arc::new(MemStore::new());
        let participants: Arc<MemStore<Participant>> = Arc::new(MemStore::new());
        let rules: Arc<dyn EntityStore<Rule>> = Arc::new(MemStore::new());
        let profiles: Arc<dyn EntityStore<Profile>> = Arc::new(MemStore::new());
        let events: Arc<dyn EntityStore<TrackedEvent>> = Arc::new(MemStore::new());
        let deliveries: Arc<dyn EntityStore<Delivery>> = Arc::new(MemStore::new());

        let assignment = AssignmentEngine::new(participants.clone(), variants.clone());
        let orchestrator = RuleOrchestrator::new(
            rules.clone(),
            profiles.clone(),
            events.clone(),
            deliveries.clone(),
            Arc::new(TemplateRenderer),
        )
        .with_event_window(config.rule_event_window)
        .with_max_results(config.max_engagements_per_evaluation);
        let reports = ReportBuilder::new(participants.clone(), variants.clone());

        Self {
            config,
            tests,
            variants,
            participants,
            rules,
            profiles,
            events,
            deliveries,
            assignment,
            orchestrator,
            reports,
        }
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.config
    }
}
