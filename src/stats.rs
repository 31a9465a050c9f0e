//! Two-proportion significance testing, confidence intervals and lift.
//!
//! All functions are pure and total: degenerate inputs (empty arms, pooled
//! rate of 0 or 1) produce `None` rather than NaN, so the report layer can
//! render an honest "undetermined" instead of a misleading number.

use serde::{Deserialize, Serialize};

/// Minimum arm size for the normal approximation behind Wald intervals
pub const MIN_ARM_FOR_INTERVAL: u64 = 30;

/// z multipliers for the supported confidence levels
const Z_95: f64 = 1.96;
const Z_99: f64 = 2.58;

/// Outcome of a two-proportion z-test between a control and a variant arm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Significance {
    pub z_score: f64,
    pub p_value: f64,
    pub is_significant: bool,
}

/// Pooled two-sample z statistic for conversion counts.
///
/// `None` when either arm is empty or the pooled rate is 0 or 1 (standard
/// error collapses to zero) — the test is undetermined, not zero.
pub fn z_score(success_a: u64, total_a: u64, success_b: u64, total_b: u64) -> Option<f64> {
    if total_a == 0 || total_b == 0 {
        return None;
    }

    let (xa, na) = (success_a as f64, total_a as f64);
    let (xb, nb) = (success_b as f64, total_b as f64);

    let p_pool = (xa + xb) / (na + nb);
    if p_pool <= 0.0 || p_pool >= 1.0 {
        return None;
    }

    let se = (p_pool * (1.0 - p_pool) * (1.0 / na + 1.0 / nb)).sqrt();
    Some((xb / nb - xa / na) / se)
}

/// Two-tailed p-value for a z statistic.
///
/// Closed-form approximation of the normal tail:
/// `p = 2 * 0.5 * exp(-0.717|z| - 0.416 z^2)`, clamped to 0 for |z| > 6.
/// Max absolute error is about 0.003, which is fine given that reports
/// already gate on minimum sample size before quoting p at all.
pub fn p_value(z: f64) -> f64 {
    let z = z.abs();
    if z > 6.0 {
        return 0.0;
    }
    (2.0 * 0.5 * (-0.717 * z - 0.416 * z * z).exp()).clamp(0.0, 1.0)
}

/// Wald confidence interval for a single proportion, clamped to [0, 1].
///
/// `None` below `MIN_ARM_FOR_INTERVAL` — the normal approximation is not
/// valid on tiny arms and an interval would be noise dressed up as math.
pub fn confidence_interval(
    success: u64,
    total: u64,
    confidence_level: f64,
) -> Option<(f64, f64)> {
    if total < MIN_ARM_FOR_INTERVAL {
        return None;
    }

    let rate = success as f64 / total as f64;
    let z = z_multiplier(confidence_level);
    let margin = z * (rate * (1.0 - rate) / total as f64).sqrt();

    Some(((rate - margin).max(0.0), (rate + margin).min(1.0)))
}

/// Relative lift of a variant over control, in percent.
///
/// Returns 0.0 when the control rate is zero (convention: conflates
/// "undefined" with "no lift", kept for compatibility with persisted
/// reports).
pub fn lift(control_rate: f64, variant_rate: f64) -> f64 {
    if control_rate == 0.0 {
        return 0.0;
    }
    (variant_rate - control_rate) / control_rate * 100.0
}

/// Full significance verdict for a variant arm against control, honoring
/// the per-test minimum sample size gate.
pub fn significance(
    control_success: u64,
    control_total: u64,
    variant_success: u64,
    variant_total: u64,
    confidence_level: f64,
    minimum_sample_size: u64,
) -> Option<Significance> {
    if control_total < minimum_sample_size || variant_total < minimum_sample_size {
        return None;
    }

    let z = z_score(control_success, control_total, variant_success, variant_total)?;
    let p = p_value(z);

    Some(Significance {
        z_score: z,
        p_value: p,
        is_significant: p < 1.0 - confidence_level,
    })
}

/// z multiplier for a confidence level. 0.95 and 0.99 come from the lookup;
/// anything else falls through to the rational inverse-normal approximation.
fn z_multiplier(confidence_level: f64) -> f64 {
    if (confidence_level - 0.95).abs() < 1e-9 {
        Z_95
    } else if (confidence_level - 0.99).abs() < 1e-9 {
        Z_99
    } else {
        inverse_normal_cdf(0.5 + confidence_level / 2.0)
    }
}

/// Inverse normal CDF (Acklam's rational approximation)
fn inverse_normal_cdf(p: f64) -> f64 {
    let a = [
        -3.969683028665376e+01,
        2.209460984245205e+02,
        -2.759285104469687e+02,
        1.383577518672690e+02,
        -3.066479806614716e+01,
        2.506628277459239e+00,
    ];
    let b = [
        -5.447609879822406e+01,
        1.615858368580409e+02,
        -1.556989798598866e+02,
        6.680131188771972e+01,
        -1.328068155288572e+01,
    ];
    let c = [
        -7.784894002430293e-03,
        -3.223964580411365e-01,
        -2.400758277161838e+00,
        -2.549732539343734e+00,
        4.374664141464968e+00,
        2.938163982698783e+00,
    ];
    let d = [
        7.784695709041462e-03,
        3.224671290700398e-01,
        2.445134137142996e+00,
        3.754408661907416e+00,
    ];

    let p_low = 0.02425;
    let p_high = 1.0 - p_low;

    if p < p_low {
        let q = (-2.0 * p.ln()).sqrt();
        (((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    } else if p <= p_high {
        let q = p - 0.5;
        let r = q * q;
        (((((a[0] * r + a[1]) * r + a[2]) * r + a[3]) * r + a[4]) * r + a[5]) * q
            / (((((b[0] * r + b[1]) * r + b[2]) * r + b[3]) * r + b[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((c[0] * q + c[1]) * q + c[2]) * q + c[3]) * q + c[4]) * q + c[5])
            / ((((d[0] * q + d[1]) * q + d[2]) * q + d[3]) * q + 1.0)
    }
}
