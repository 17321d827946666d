//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps domain errors from ims-state and ims-core to HTTP status codes.
//! Returns JSON error response bodies with an error type, message, and
//! details. Never exposes internal error details in production responses.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use ims_core::FieldViolation;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses use this format for consistency across the API
/// surface. `success` is always `false`; the `details` object carries
/// `{field, value, message}` for validation errors and
/// `{resetTime, limit, remaining}` for rate-limit rejections.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type name (e.g. "ValidationError", "NotFoundError", "ApiError").
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
///
/// Maps domain errors to appropriate HTTP status codes and structured JSON
/// error bodies. Internal error details are never exposed to clients.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed or an illegal transition was attempted (400).
    #[error("validation error: {0}")]
    Validation(FieldViolation),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Authentication failure — missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authorization failure — insufficient role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Rate-limit budget exceeded (429).
    #[error("rate limit exceeded: {limit} requests per window")]
    TooManyRequests {
        limit: u64,
        reset_time: DateTime<Utc>,
    },

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),

    /// Service dependency not configured or unhealthy (503).
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    /// Construct a validation error for a named field.
    pub fn validation(
        field: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation(FieldViolation::new(field, value, message))
    }

    /// Construct a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Return the HTTP status code and error type name for this error.
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NotFoundError"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "AuthenticationError"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "AuthorizationError"),
            Self::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, "ApiError"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ServerError"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "ServerError"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        // Never expose internal error messages to clients.
        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        // Log server-side errors for operator visibility.
        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::ServiceUnavailable(_) => tracing::warn!(error = %self, "service unavailable"),
            _ => {}
        }

        let details = match &self {
            Self::Validation(violation) => serde_json::to_value(violation).ok(),
            Self::TooManyRequests { limit, reset_time } => Some(serde_json::json!({
                "resetTime": reset_time.to_rfc3339(),
                "limit": limit,
                "remaining": 0,
            })),
            _ => None,
        };

        let body = ErrorBody {
            success: false,
            error: ErrorDetail {
                kind: kind.to_string(),
                message,
                details,
            },
        };

        let mut response = (status, Json(body)).into_response();

        // Rate-limit rejections also carry the standard headers.
        if let Self::TooManyRequests { limit, reset_time } = &self {
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("RateLimit-Limit", v);
            }
            headers.insert("RateLimit-Remaining", HeaderValue::from_static("0"));
            if let Ok(v) = HeaderValue::from_str(&reset_time.to_rfc3339()) {
                headers.insert("RateLimit-Reset", v);
            }
        }

        response
    }
}

/// Convert order state machine errors to API errors.
///
/// Every order rule violation is the client's fault: illegal transitions,
/// non-editable states, and missing fields all map to 400 with a
/// `{field, value, message}` detail naming what was wrong.
impl From<ims_state::OrderError> for AppError {
    fn from(err: ims_state::OrderError) -> Self {
        use ims_state::OrderError;
        match err {
            OrderError::Field(v) => Self::Validation(v),
            OrderError::InvalidTransition { current, .. }
            | OrderError::NotEditable { current } => {
                Self::Validation(FieldViolation::new("status", current, err.to_string()))
            }
            OrderError::StatusChangeNotAllowed { to, .. } => {
                Self::Validation(FieldViolation::new("status", to, err.to_string()))
            }
            OrderError::MissingCancellationReason => {
                Self::Validation(FieldViolation::new("reason", "", err.to_string()))
            }
            OrderError::DeleteWindowExpired { age_hours } => Self::Validation(
                FieldViolation::new("created_at", format!("{age_hours}h ago"), err.to_string()),
            ),
        }
    }
}

/// Convert purchase state machine errors to API errors.
impl From<ims_state::PurchaseError> for AppError {
    fn from(err: ims_state::PurchaseError) -> Self {
        use ims_state::PurchaseError;
        match err {
            PurchaseError::Field(v) => Self::Validation(v),
            PurchaseError::InvalidTransition { current, .. }
            | PurchaseError::NotEditable { current } => {
                Self::Validation(FieldViolation::new("status", current, err.to_string()))
            }
            PurchaseError::StatusChangeNotAllowed { to, .. } => {
                Self::Validation(FieldViolation::new("status", to, err.to_string()))
            }
            PurchaseError::MissingReason { .. } => {
                Self::Validation(FieldViolation::new("reason", "", err.to_string()))
            }
            PurchaseError::DeleteWindowExpired { age_hours } => Self::Validation(
                FieldViolation::new("created_at", format!("{age_hours}h ago"), err.to_string()),
            ),
        }
    }
}

/// Convert stock ledger errors to API errors.
impl From<ims_state::StockError> for AppError {
    fn from(err: ims_state::StockError) -> Self {
        use ims_state::StockError;
        match &err {
            StockError::InsufficientStock {
                available,
                requested,
                ..
            } => Self::Validation(FieldViolation::new(
                "quantity",
                format!("{requested} (available {available})"),
                err.to_string(),
            )),
            StockError::NonPositiveQuantity(q) => {
                Self::Validation(FieldViolation::new("quantity", q, err.to_string()))
            }
            StockError::ZeroAdjustment => {
                Self::Validation(FieldViolation::new("delta", 0, err.to_string()))
            }
            StockError::MissingReason { .. } => {
                Self::Validation(FieldViolation::new("reason", "", err.to_string()))
            }
            StockError::SameWarehouse => Self::Validation(FieldViolation::new(
                "to_warehouse_id",
                "",
                err.to_string(),
            )),
        }
    }
}
