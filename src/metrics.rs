//! Production-grade metrics with Prometheus
//!
//! Exposes key operational metrics for monitoring and alerting:
//! - Request rates and latencies
//! - Assignment and conversion throughput
//! - Rule evaluation and delivery volume
//!
//! NOTE: We intentionally avoid user_id in metric labels to prevent
//! high-cardinality explosion that can crash Prometheus.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "nudge_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Experiment Metrics
    // NOTE: test_id is bounded by the number of configured experiments
    // ============================================================================

    /// Assignment outcomes
    pub static ref ASSIGNMENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_assignments_total", "Total variant assignment requests"),
        &["outcome"]  // outcome: "assigned", "existing", or a reject reason
    ).unwrap();

    /// Assignment duration
    pub static ref ASSIGNMENT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "nudge_assignment_duration_seconds",
            "Variant assignment duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05])
    ).unwrap();

    /// Conversion recordings
    pub static ref CONVERSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_conversions_total", "Total conversion recordings"),
        &["result"]  // result: "recorded", "not_a_participant", "error"
    ).unwrap();

    /// Analysis report builds
    pub static ref ANALYSIS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_analysis_total", "Total analysis report builds"),
        &["result"]
    ).unwrap();

    // ============================================================================
    // Rule Engine Metrics
    // ============================================================================

    /// Rule evaluation passes
    pub static ref RULE_EVALUATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_rule_evaluations_total", "Total rule evaluation passes"),
        &["result"]  // result: "ok", "error"
    ).unwrap();

    /// Rule evaluation duration
    pub static ref RULE_EVALUATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "nudge_rule_evaluation_duration_seconds",
            "Rule evaluation pass duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1])
    ).unwrap();

    /// Rules fired (deliveries created) by priority
    pub static ref RULES_FIRED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_rules_fired_total", "Total rule firings by priority"),
        &["priority"]
    ).unwrap();

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Error responses by machine code, fed from AppError::into_response
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nudge_errors_total", "Total error responses by code"),
        &["error_type"]
    ).unwrap();

    // ============================================================================
    // Concurrency Metrics
    // ============================================================================

    /// Current concurrent requests
    pub static ref CONCURRENT_REQUESTS: IntGauge = IntGauge::new(
        "nudge_concurrent_requests",
        "Current number of concurrent requests"
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    // Request metrics
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    // Experiment metrics
    METRICS_REGISTRY.register(Box::new(ASSIGNMENTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ASSIGNMENT_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(CONVERSIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(ANALYSIS_TOTAL.clone()))?;

    // Rule engine metrics
    METRICS_REGISTRY.register(Box::new(RULE_EVALUATIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RULE_EVALUATION_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(RULES_FIRED_TOTAL.clone()))?;

    // Error metrics
    METRICS_REGISTRY.register(Box::new(ERRORS_TOTAL.clone()))?;

    // Concurrency metrics
    METRICS_REGISTRY.register(Box::new(CONCURRENT_REQUESTS.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
#[allow(unused)] // Public API utility for metrics consumers
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

#[allow(unused)] // Public API utility
impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
