//! Test analysis reports: per-variant counts, lift, significance,
//! confidence intervals and heuristic recommendations.
//!
//! Reports are point-in-time reads over participant rows (the source of
//! truth); they hold no locks and tolerate participants arriving while the
//! report is built.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::model::{Participant, Test, TestStatus, Variant};
use crate::stats::{self, Significance};
use crate::store::EntityStore;

#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub variant_id: String,
    pub name: String,
    pub is_control: bool,
    pub participants: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    /// Relative to control; 0.0 for the control arm itself
    pub lift_percentage: f64,
    /// None until both arms reach the minimum sample size
    pub statistical_significance: Option<Significance>,
    /// None until the arm reaches 30 participants
    pub confidence_interval: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestReport {
    pub test_id: String,
    pub status: TestStatus,
    pub total_participants: u64,
    pub control: Option<VariantReport>,
    pub variants: Vec<VariantReport>,
    pub recommendations: Vec<String>,
}

pub struct ReportBuilder {
    participants: Arc<dyn EntityStore<Participant>>,
    variants: Arc<dyn EntityStore<Variant>>,
}

struct ArmCounts {
    participants: u64,
    conversions: u64,
    rate: f64,
}

impl ReportBuilder {
    pub fn new(
        participants: Arc<dyn EntityStore<Participant>>,
        variants: Arc<dyn EntityStore<Variant>>,
    ) -> Self {
        Self {
            participants,
            variants,
        }
    }

    pub fn analyze(&self, test: &Test) -> Result<TestReport> {
        let mut variants = self
            .variants
            .filter(&|v: &Variant| v.test_id == test.id, None)?;
        variants.sort_by(|a, b| {
            b.is_control
                .cmp(&a.is_control)
                .then_with(|| a.name.cmp(&b.name))
        });

        let rows = self
            .participants
            .filter(&|p: &Participant| p.test_id == test.id, None)?;
        let total_participants = rows.len() as u64;

        let counts_for = |variant_id: &str| -> ArmCounts {
            let participants = rows.iter().filter(|p| p.variant_id == variant_id).count() as u64;
            let conversions = rows
                .iter()
                .filter(|p| p.variant_id == variant_id && p.converted)
                .count() as u64;
            let rate = if participants > 0 {
                conversions as f64 / participants as f64
            } else {
                0.0
            };
            ArmCounts {
                participants,
                conversions,
                rate,
            }
        };

        let control_variant = variants.iter().find(|v| v.is_control);
        let control_counts = control_variant.map(|v| counts_for(&v.id));

        let settings = &test.statistical_settings;
        let mut reports = Vec::with_capacity(variants.len());
        for variant in &variants {
            let counts = counts_for(&variant.id);

            let (lift_percentage, significance) = match (&control_counts, variant.is_control) {
                (Some(control), false) => (
                    stats::lift(control.rate, counts.rate),
                    stats::significance(
                        control.conversions,
                        control.participants,
                        counts.conversions,
                        counts.participants,
                        settings.confidence_level,
                        settings.minimum_sample_size,
                    ),
                ),
                _ => (0.0, None),
            };

            reports.push(VariantReport {
                variant_id: variant.id.clone(),
                name: variant.name.clone(),
                is_control: variant.is_control,
                participants: counts.participants,
                conversions: counts.conversions,
                conversion_rate: counts.rate,
                lift_percentage,
                statistical_significance: significance,
                confidence_interval: stats::confidence_interval(
                    counts.conversions,
                    counts.participants,
                    settings.confidence_level,
                ),
            });
        }

        let recommendations = self.recommendations(test, &reports);
        let control = reports.iter().find(|r| r.is_control).cloned();

        Ok(TestReport {
            test_id: test.id.clone(),
            status: test.status,
            total_participants,
            control,
            variants: reports,
            recommendations,
        })
    }

    /// The winning variant id, if any non-control arm is significantly
    /// better than control. Used when completing a test.
    pub fn pick_winner(report: &TestReport) -> Option<String> {
        report
            .variants
            .iter()
            .filter(|v| !v.is_control && v.lift_percentage > 0.0)
            .filter(|v| {
                v.statistical_significance
                    .as_ref()
                    .map(|s| s.is_significant)
                    .unwrap_or(false)
            })
            .max_by(|a, b| {
                a.lift_percentage
                    .partial_cmp(&b.lift_percentage)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|v| v.variant_id.clone())
    }

    fn recommendations(&self, test: &Test, reports: &[VariantReport]) -> Vec<String> {
        let mut recommendations = Vec::new();
        let min = test.statistical_settings.minimum_sample_size;

        let under_sampled: Vec<&VariantReport> =
            reports.iter().filter(|r| r.participants < min).collect();
        if !under_sampled.is_empty() {
            let names: Vec<&str> = under_sampled.iter().map(|r| r.name.as_str()).collect();
            recommendations.push(format!(
                "Insufficient data: {} below the minimum sample size of {} — keep the test running",
                names.join(", "),
                min
            ));
            return recommendations;
        }

        let mut significant: Vec<&VariantReport> = reports
            .iter()
            .filter(|r| {
                !r.is_control
                    && r.statistical_significance
                        .as_ref()
                        .map(|s| s.is_significant)
                        .unwrap_or(false)
            })
            .collect();
        significant.sort_by(|a, b| {
            b.lift_percentage
                .partial_cmp(&a.lift_percentage)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        match significant.first() {
            Some(best) if best.lift_percentage > 0.0 => {
                recommendations.push(format!(
                    "Variant '{}' outperforms control with {:.1}% lift (p = {:.4})",
                    best.name,
                    best.lift_percentage,
                    best.statistical_significance
                        .as_ref()
                        .map(|s| s.p_value)
                        .unwrap_or(f64::NAN)
                ));
                recommendations
                    .push("Recommendation: roll out the winning variant".to_string());
            }
            Some(worst) => {
                recommendations.push(format!(
                    "Variant '{}' performs {:.1}% worse than control — keep control",
                    worst.name, -worst.lift_percentage
                ));
            }
            None => {
                recommendations
                    .push("No statistically significant difference detected yet".to_string());
            }
        }

        recommendations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StatisticalSettings, VariantMetrics};
    use crate::store::MemStore;
    use chrono::Utc;
    use serde_json::Value;

    fn seed_arm(
        store: &MemStore<Participant>,
        test_id: &str,
        variant_id: &str,
        total: u64,
        converted: u64,
    ) {
        for i in 0..total {
            store
                .create(Participant {
                    test_id: test_id.into(),
                    user_id: format!("{variant_id}_user_{i}"),
                    variant_id: variant_id.into(),
                    converted: i < converted,
                    conversion_events: Vec::new(),
                    assigned_at: Utc::now(),
                })
                .unwrap();
        }
    }

    fn variant(id: &str, test_id: &str, control: bool) -> Variant {
        Variant {
            id: id.into(),
            test_id: test_id.into(),
            name: id.into(),
            is_control: control,
            traffic_weight: 1.0,
            configuration: Value::Null,
            performance_metrics: VariantMetrics::default(),
        }
    }

    fn test_entity(id: &str, min_sample: u64) -> Test {
        Test {
            id: id.into(),
            name: id.into(),
            client_app_id: "app".into(),
            status: TestStatus::Running,
            traffic_allocation: 1.0,
            statistical_settings: StatisticalSettings {
                confidence_level: 0.95,
                minimum_sample_size: min_sample,
            },
            winner_variant_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn builder() -> (Arc<MemStore<Participant>>, Arc<MemStore<Variant>>, ReportBuilder) {
        let participants = Arc::new(MemStore::new());
        let variants = Arc::new(MemStore::new());
        let builder = ReportBuilder::new(participants.clone(), variants.clone());
        (participants, variants, builder)
    }

    #[test]
    fn significant_winner_is_reported() {
        let (participants, variants, builder) = builder();
        variants.create(variant("control", "t1", true)).unwrap();
        variants.create(variant("treatment", "t1", false)).unwrap();
        // 100/1000 vs 130/1000 clears the 95% bar
        seed_arm(&participants, "t1", "control", 1000, 100);
        seed_arm(&participants, "t1", "treatment", 1000, 130);

        let report = builder.analyze(&test_entity("t1", 100)).unwrap();
        assert_eq!(report.total_participants, 2000);

        let control = report.control.as_ref().unwrap();
        assert_eq!(control.conversions, 100);
        assert!(control.statistical_significance.is_none());

        let treatment = report
            .variants
            .iter()
            .find(|v| v.variant_id == "treatment")
            .unwrap();
        assert!((treatment.lift_percentage - 30.0).abs() < 0.01);
        let sig = treatment.statistical_significance.as_ref().unwrap();
        assert!(sig.is_significant);
        assert!((0.030..0.040).contains(&sig.p_value));
        let (lo, hi) = treatment.confidence_interval.unwrap();
        assert!(lo <= 0.13 && 0.13 <= hi);

        assert_eq!(
            ReportBuilder::pick_winner(&report),
            Some("treatment".to_string())
        );
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("outperforms control")));
    }

    #[test]
    fn under_sampled_test_gets_null_statistics() {
        let (participants, variants, builder) = builder();
        variants.create(variant("control", "t1", true)).unwrap();
        variants.create(variant("treatment", "t1", false)).unwrap();
        seed_arm(&participants, "t1", "control", 20, 5);
        seed_arm(&participants, "t1", "treatment", 20, 9);

        let report = builder.analyze(&test_entity("t1", 100)).unwrap();
        let treatment = report
            .variants
            .iter()
            .find(|v| v.variant_id == "treatment")
            .unwrap();
        assert!(treatment.statistical_significance.is_none());
        // Arms of 20 are also below the interval floor of 30
        assert!(treatment.confidence_interval.is_none());
        assert!(ReportBuilder::pick_winner(&report).is_none());
        assert!(report.recommendations[0].contains("Insufficient data"));
    }

    #[test]
    fn no_difference_recommendation() {
        let (participants, variants, builder) = builder();
        variants.create(variant("control", "t1", true)).unwrap();
        variants.create(variant("treatment", "t1", false)).unwrap();
        seed_arm(&participants, "t1", "control", 500, 50);
        seed_arm(&participants, "t1", "treatment", 500, 52);

        let report = builder.analyze(&test_entity("t1", 100)).unwrap();
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.contains("No statistically significant difference")));
        assert!(ReportBuilder::pick_winner(&report).is_none());
    }
}
