//! HTTP request tracking middleware for observability

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use std::time::Instant;

/// RAII guard so the in-flight gauge is decremented even when the
/// request future is dropped mid-flight.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        crate::metrics::CONCURRENT_REQUESTS.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        crate::metrics::CONCURRENT_REQUESTS.dec();
    }
}

/// Middleware to track HTTP request latency, counts and in-flight load
pub async fn track_metrics(req: Request, next: Next) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let _in_flight = InFlight::enter();
    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    // Normalize path to avoid high cardinality (group dynamic IDs)
    let normalized_path = normalize_path(&path);

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &normalized_path, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &normalized_path, &status])
        .inc();

    Ok(response)
}

/// Normalize path to prevent metric cardinality explosion
/// /api/experiments/exp_001/assign -> /api/experiments/{id}/assign
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    let mut normalized = Vec::new();

    for part in parts {
        if part.is_empty() {
            continue;
        }

        if is_id(part) {
            normalized.push("{id}");
        } else {
            normalized.push(part);
        }
    }

    format!("/{}", normalized.join("/"))
}

/// Check if a path segment looks like an ID (UUID, numeric, user ID, etc.)
fn is_id(segment: &str) -> bool {
    // UUID pattern
    if segment.contains('-') && segment.len() >= 32 {
        return true;
    }

    // Numeric ID
    if segment.chars().all(|c| c.is_numeric()) && !segment.is_empty() {
        return true;
    }

    // Looks like a hash or long alphanumeric
    if segment.len() > 20 {
        return true;
    }

    // Entity ID pattern (alphanumeric with digits, like "exp_001" or "user123")
    let has_digit = segment.chars().any(|c| c.is_numeric());
    let is_alphanumeric = segment.chars().all(|c| c.is_alphanumeric() || c == '_');
    if has_digit && is_alphanumeric && segment.len() >= 4 {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_gauge_tracks_guard_lifetime() {
        let baseline = crate::metrics::CONCURRENT_REQUESTS.get();
        {
            let _guard = InFlight::enter();
            assert_eq!(crate::metrics::CONCURRENT_REQUESTS.get(), baseline + 1);
        }
        assert_eq!(crate::metrics::CONCURRENT_REQUESTS.get(), baseline);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/experiments/exp_001/assign"),
            "/api/experiments/{id}/assign"
        );
        assert_eq!(
            normalize_path("/api/experiments/550e8400-e29b-41d4-a716-446655440000/analyze"),
            "/api/experiments/{id}/analyze"
        );
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(
            normalize_path("/api/profiles/user123"),
            "/api/profiles/{id}"
        );
    }
}
