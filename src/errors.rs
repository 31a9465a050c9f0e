//! Structured error types with machine-readable codes
//! Provides detailed error information for debugging and client error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured error response for API clients
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Additional error context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Application error types with proper categorization
///
/// Policy rejections (test not running, excluded from traffic, frequency
/// capped, ...) are NOT errors — they travel as structured
/// `{assigned: false, reason}` payloads. Only genuine failures live here.
#[derive(Debug)]
pub enum AppError {
    // Validation errors (400)
    InvalidInput { field: String, reason: String },
    InvalidUserId(String),
    InvalidTestConfig(String),
    InvalidRuleConfig(String),

    // Not found (404)
    TestNotFound(String),
    RuleNotFound(String),

    // Conflict (409)
    TestAlreadyExists(String),

    // Internal (500) — store failures are the only case that propagates
    // as a hard failure to the caller
    StoreError(String),
    SerializationError(String),

    // Generic wrapper for external errors
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for client identification
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidUserId(_) => "INVALID_USER_ID",
            Self::InvalidTestConfig(_) => "INVALID_TEST_CONFIG",
            Self::InvalidRuleConfig(_) => "INVALID_RULE_CONFIG",
            Self::TestNotFound(_) => "TEST_NOT_FOUND",
            Self::RuleNotFound(_) => "RULE_NOT_FOUND",
            Self::TestAlreadyExists(_) => "TEST_ALREADY_EXISTS",
            Self::StoreError(_) => "STORE_ERROR",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. }
            | Self::InvalidUserId(_)
            | Self::InvalidTestConfig(_)
            | Self::InvalidRuleConfig(_) => StatusCode::BAD_REQUEST,

            Self::TestNotFound(_) | Self::RuleNotFound(_) => StatusCode::NOT_FOUND,

            Self::TestAlreadyExists(_) => StatusCode::CONFLICT,

            Self::StoreError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get detailed error message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::InvalidUserId(msg) => format!("Invalid user ID: {msg}"),
            Self::InvalidTestConfig(msg) => format!("Invalid test configuration: {msg}"),
            Self::InvalidRuleConfig(msg) => format!("Invalid rule configuration: {msg}"),
            Self::TestNotFound(id) => format!("Test not found: {id}"),
            Self::RuleNotFound(id) => format!("Rule not found: {id}"),
            Self::TestAlreadyExists(id) => format!("Test already exists: {id}"),
            Self::StoreError(msg) => format!("Store error: {msg}"),
            Self::SerializationError(msg) => format!("Serialization error: {msg}"),
            Self::Internal(err) => format!("Internal error: {err}"),
        }
    }

    /// Convert to structured error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code().to_string(),
            message: self.message(),
            details: None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for AppError {}

/// Convert from anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

/// Axum IntoResponse implementation for proper HTTP responses
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = self.to_response();

        crate::metrics::ERRORS_TOTAL
            .with_label_values(&[self.code()])
            .inc();

        (status, Json(body)).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
