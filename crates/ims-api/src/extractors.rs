//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request DTOs and a helper to
//! extract + validate JSON bodies in handlers.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use ims_core::FieldViolation;

use crate::error::AppError;

/// Trait for request types that can validate their business rules beyond
/// what serde deserialization checks.
pub trait Validate {
    /// Validate business rules. Returns the offending field on failure.
    fn validate(&self) -> Result<(), FieldViolation>;
}

/// Extract a JSON body, mapping deserialization errors to
/// [`AppError::BadRequest`].
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
///
/// Combines deserialization error mapping with business rule validation.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate().map_err(AppError::Validation)?;
    Ok(value)
}

/// Require a non-empty trimmed string field.
pub fn require_non_empty(field: &str, value: &str) -> Result<(), FieldViolation> {
    if value.trim().is_empty() {
        return Err(FieldViolation::new(field, value, "must not be empty"));
    }
    Ok(())
}

/// Reject strings over `max` characters.
pub fn require_max_len(field: &str, value: &str, max: usize) -> Result<(), FieldViolation> {
    if value.len() > max {
        return Err(FieldViolation::new(
            field,
            format!("{} chars", value.len()),
            format!("must not exceed {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_rejects_whitespace() {
        assert!(require_non_empty("name", "  ").is_err());
        assert!(require_non_empty("name", "ok").is_ok());
    }

    #[test]
    fn max_len_boundary() {
        assert!(require_max_len("name", "abc", 3).is_ok());
        assert!(require_max_len("name", "abcd", 3).is_err());
    }
}
