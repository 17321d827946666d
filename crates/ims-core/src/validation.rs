// SPDX-License-Identifier: BUSL-1.1
//! Field-level validation error.
//!
//! Every rejected input or illegal transition surfaces as a [`FieldViolation`]
//! naming the offending field, the value that was supplied, and a
//! human-readable reason. The API layer serializes it verbatim into the
//! `details` object of 400 responses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single validation failure tied to a named field.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{field}: {message}")]
pub struct FieldViolation {
    /// The field that failed validation (e.g. `"status"`, `"line_items[2].quantity"`).
    pub field: String,
    /// The offending value, rendered as a string.
    pub value: String,
    /// Human-readable reason the value was rejected.
    pub message: String,
}

impl FieldViolation {
    /// Construct a violation for `field` carrying the offending `value`.
    pub fn new(
        field: impl Into<String>,
        value: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_field_and_reason() {
        let v = FieldViolation::new("quantity", 0, "must be greater than zero");
        assert_eq!(v.to_string(), "quantity: must be greater than zero");
        assert_eq!(v.value, "0");
    }

    #[test]
    fn serializes_all_three_fields() {
        let v = FieldViolation::new("status", "Completed", "order is not cancellable");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["field"], "status");
        assert_eq!(json["value"], "Completed");
        assert_eq!(json["message"], "order is not cancellable");
    }
}
