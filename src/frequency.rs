//! Sliding-window frequency caps for rule deliveries.
//!
//! Contrast with the condition operators: the limiter fails OPEN on an
//! unknown period. A misconfigured cap should not silently block every
//! engagement for a user, while a misconfigured condition must never fire
//! an action.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::model::{Delivery, MaxFrequency};
use crate::store::EntityStore;

/// Lookback window for a frequency period; `None` for unrecognized periods
pub fn window_for(period: &str) -> Option<Duration> {
    match period {
        "hour" => Some(Duration::hours(1)),
        "day" => Some(Duration::days(1)),
        "week" => Some(Duration::weeks(1)),
        "month" => Some(Duration::days(30)),
        _ => None,
    }
}

pub struct FrequencyLimiter {
    deliveries: Arc<dyn EntityStore<Delivery>>,
}

impl FrequencyLimiter {
    pub fn new(deliveries: Arc<dyn EntityStore<Delivery>>) -> Self {
        Self { deliveries }
    }

    /// Whether another delivery for (user, rule) is allowed right now.
    pub fn allowed(
        &self,
        user_id: &str,
        rule_id: &str,
        max_frequency: Option<&MaxFrequency>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(cap) = max_frequency else {
            return Ok(true);
        };

        let Some(window) = window_for(&cap.period) else {
            tracing::warn!(
                rule_id,
                period = %cap.period,
                "unknown frequency period, allowing delivery"
            );
            return Ok(true);
        };

        let cutoff = now - window;
        let recent = self.deliveries.filter(
            &|d: &Delivery| {
                d.user_id == user_id && d.rule_id == rule_id && d.created_at > cutoff
            },
            Some(cap.limit as usize),
        )?;

        Ok((recent.len() as u32) < cap.limit)
    }
}
