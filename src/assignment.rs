//! Deterministic variant assignment: traffic gate plus weighted bucketing.
//!
//! Assignment is idempotent and permanent. A user's bucket never changes,
//! even if the test's traffic allocation or weights change later — the
//! persisted participant row always wins over a recomputed hash.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use crate::hashing::hash_to_unit;
use crate::model::{ConversionEvent, Participant, Test, TestStatus, Variant};
use crate::store::{CreateOutcome, EntityStore, ParticipantStore};

/// Expected outcomes that are not errors; serialized as the `reason` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    TestNotRunning,
    NoVariants,
    ExcludedFromTraffic,
    NotAParticipant,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TestNotRunning => "test_not_running",
            Self::NoVariants => "no_variants",
            Self::ExcludedFromTraffic => "excluded_from_traffic",
            Self::NotAParticipant => "not_a_participant",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AssignmentOutcome {
    Assigned {
        variant: Variant,
        /// false when an existing participant row was returned
        fresh: bool,
    },
    Rejected(RejectReason),
}

pub struct AssignmentEngine {
    participants: Arc<dyn ParticipantStore>,
    variants: Arc<dyn EntityStore<Variant>>,
}

impl AssignmentEngine {
    pub fn new(
        participants: Arc<dyn ParticipantStore>,
        variants: Arc<dyn EntityStore<Variant>>,
    ) -> Self {
        Self {
            participants,
            variants,
        }
    }

    /// Assign `user_id` to a variant of `test`, or reject with a reason.
    pub fn assign(
        &self,
        test: &Test,
        variants: &[Variant],
        user_id: &str,
    ) -> Result<AssignmentOutcome> {
        // Existing participants keep their variant unconditionally, even if
        // the test is no longer running or its configuration changed.
        let key = Participant::key_for(&test.id, user_id);
        if let Some(existing) = self.participants.get(&key)? {
            return self.outcome_for_existing(test, variants, &existing);
        }

        if test.status != TestStatus::Running {
            return Ok(AssignmentOutcome::Rejected(RejectReason::TestNotRunning));
        }
        if variants.is_empty() {
            return Ok(AssignmentOutcome::Rejected(RejectReason::NoVariants));
        }

        // Traffic gate. Users hashed above the allocation are permanently
        // outside the experiment; this is not retried on later calls.
        let traffic_hash = hash_to_unit(user_id, &test.id);
        if traffic_hash > test.traffic_allocation {
            return Ok(AssignmentOutcome::Rejected(RejectReason::ExcludedFromTraffic));
        }

        // Second, independent hash so traffic inclusion and bucket choice
        // are uncorrelated.
        let variant_hash = hash_to_unit(&format!("{user_id}_variant"), &test.id);
        let variant = pick_variant(variants, variant_hash).clone();

        let row = Participant {
            test_id: test.id.clone(),
            user_id: user_id.to_string(),
            variant_id: variant.id.clone(),
            converted: false,
            conversion_events: Vec::new(),
            assigned_at: Utc::now(),
        };

        match self.participants.create_if_absent(row)? {
            CreateOutcome::Created(_) => {
                // Best-effort counter; the analysis report recomputes from
                // participant rows regardless.
                let _ = self.variants.update(&variant.id, &|v| {
                    v.performance_metrics.participants += 1;
                });
                tracing::debug!(
                    test_id = %test.id,
                    user_id,
                    variant_id = %variant.id,
                    "assigned user to variant"
                );
                Ok(AssignmentOutcome::Assigned {
                    variant,
                    fresh: true,
                })
            }
            // A concurrent assignment raced ahead: return the winner's
            // variant instead of erroring or double-writing.
            CreateOutcome::Existing(winner) => {
                self.outcome_for_existing(test, variants, &winner)
            }
        }
    }

    /// Record a conversion for an existing participant.
    pub fn record_conversion(
        &self,
        test: &Test,
        user_id: &str,
        metric_name: &str,
        event_type: &str,
        value: f64,
    ) -> Result<Option<RejectReason>> {
        let key = Participant::key_for(&test.id, user_id);
        let Some(participant) = self.participants.get(&key)? else {
            return Ok(Some(RejectReason::NotAParticipant));
        };

        let first_conversion = !participant.converted;
        let event = ConversionEvent {
            metric_name: metric_name.to_string(),
            event_type: event_type.to_string(),
            value,
            timestamp: Utc::now(),
        };

        self.participants.update(&key, &|p| {
            p.converted = true;
            p.conversion_events.push(event.clone());
        })?;

        let variant_id = participant.variant_id.clone();
        let _ = self.variants.update(&variant_id, &|v| {
            v.performance_metrics.total_events += 1;
            if first_conversion {
                v.performance_metrics.conversions += 1;
            }
            if v.performance_metrics.participants > 0 {
                v.performance_metrics.conversion_rate = v.performance_metrics.conversions as f64
                    / v.performance_metrics.participants as f64;
            }
        });

        Ok(None)
    }

    fn outcome_for_existing(
        &self,
        test: &Test,
        variants: &[Variant],
        participant: &Participant,
    ) -> Result<AssignmentOutcome> {
        let variant = match variants.iter().find(|v| v.id == participant.variant_id) {
            Some(v) => v.clone(),
            // Variant list handed in may be stale; fall back to the store
            None => match self.variants.get(&participant.variant_id)? {
                Some(v) => v,
                None => {
                    tracing::warn!(
                        test_id = %test.id,
                        variant_id = %participant.variant_id,
                        "participant references unknown variant"
                    );
                    return Ok(AssignmentOutcome::Rejected(RejectReason::NoVariants));
                }
            },
        };
        Ok(AssignmentOutcome::Assigned {
            variant,
            fresh: false,
        })
    }
}

/// Weighted bucket selection: normalize weights, walk in given order,
/// pick the first variant whose cumulative weight reaches the hash.
///
/// If floating-point rounding leaves the cumulative sum below the hash, the
/// LAST variant wins. Falling back to the first would systematically favor
/// whichever variant happens to be listed first.
pub fn pick_variant(variants: &[Variant], variant_hash: f64) -> &Variant {
    let total: f64 = variants.iter().map(|v| v.traffic_weight.max(0.0)).sum();
    if total <= 0.0 {
        // Degenerate weights: uniform fallback over the list
        let idx = (variant_hash * variants.len() as f64) as usize;
        return &variants[idx.min(variants.len() - 1)];
    }

    let mut cumulative = 0.0;
    for variant in variants {
        cumulative += variant.traffic_weight.max(0.0) / total;
        if cumulative >= variant_hash {
            return variant;
        }
    }
    &variants[variants.len() - 1]
}
