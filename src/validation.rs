//! Input validation for API requests
//! Rejects malformed identifiers and out-of-range parameters before any
//! state mutation happens.

use anyhow::{anyhow, Result};

/// Maximum lengths for security
pub const MAX_USER_ID_LENGTH: usize = 128;
pub const MAX_ENTITY_ID_LENGTH: usize = 128;
pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_TEMPLATE_LENGTH: usize = 10_000;
pub const MAX_CONDITIONS_PER_RULE: usize = 50;

/// Validate user_id
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(anyhow!("user_id cannot be empty"));
    }

    if user_id.len() > MAX_USER_ID_LENGTH {
        return Err(anyhow!(
            "user_id too long: {} chars (max: {})",
            user_id.len(),
            MAX_USER_ID_LENGTH
        ));
    }

    // Only allow alphanumeric, dash, underscore, @ and dot
    if !user_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '@' || c == '.')
    {
        return Err(anyhow!(
            "user_id contains invalid characters (allowed: alphanumeric, -, _, @, .)"
        ));
    }

    Ok(())
}

/// Validate a test/rule/variant identifier (slug or UUID)
pub fn validate_entity_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("id cannot be empty"));
    }

    if id.len() > MAX_ENTITY_ID_LENGTH {
        return Err(anyhow!(
            "id too long: {} chars (max: {})",
            id.len(),
            MAX_ENTITY_ID_LENGTH
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "id contains invalid characters (allowed: alphanumeric, -, _)"
        ));
    }

    Ok(())
}

/// Validate a human-readable name
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("name cannot be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(anyhow!(
            "name too long: {} chars (max: {})",
            name.len(),
            MAX_NAME_LENGTH
        ));
    }
    if name.chars().any(|c| c.is_control()) {
        return Err(anyhow!("name contains invalid control characters"));
    }
    Ok(())
}

/// Validate traffic allocation
pub fn validate_traffic_allocation(allocation: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&allocation) || !allocation.is_finite() {
        return Err(anyhow!(
            "traffic_allocation must be between 0.0 and 1.0, got: {allocation}"
        ));
    }
    Ok(())
}

/// Validate a variant traffic weight
pub fn validate_traffic_weight(weight: f64) -> Result<()> {
    if weight <= 0.0 || !weight.is_finite() {
        return Err(anyhow!("traffic_weight must be > 0, got: {weight}"));
    }
    Ok(())
}

/// Validate a confidence level
pub fn validate_confidence_level(level: f64) -> Result<()> {
    if !(0.5..1.0).contains(&level) {
        return Err(anyhow!(
            "confidence_level must be in [0.5, 1.0), got: {level}"
        ));
    }
    Ok(())
}

/// Validate an engagement template
pub fn validate_template(template: &str) -> Result<()> {
    if template.len() > MAX_TEMPLATE_LENGTH {
        return Err(anyhow!(
            "content_template too long: {} chars (max: {})",
            template.len(),
            MAX_TEMPLATE_LENGTH
        ));
    }
    Ok(())
}
