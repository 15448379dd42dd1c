//! Field-level validation errors.
//!
//! Request schemas collect every failing field into a [`ValidationErrors`]
//! so callers learn which field failed and why in a single response.

use std::fmt;

use serde::Serialize;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Name of the offending field as it appears in the request body.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// One or more field validation failures.
///
/// `summary` is the headline message shown to clients; `errors` lists each
/// failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub struct ValidationErrors {
    pub summary: String,
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Creates an empty error set with the given headline message.
    #[must_use]
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            errors: Vec::new(),
        }
    }

    /// Creates an error set holding exactly one field failure.
    #[must_use]
    pub fn single(
        summary: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut errors = Self::new(summary);
        errors.add(field, message);
        errors
    }

    /// Records a failing field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Records `field` as missing when `value` is absent or blank.
    ///
    /// Returns the trimmed-nonempty value when present.
    pub fn require<'a>(&mut self, field: &str, value: Option<&'a str>) -> Option<&'a str> {
        match value {
            Some(v) if !v.trim().is_empty() => Some(v),
            _ => {
                self.add(field, format!("{field} is required"));
                None
            }
        }
    }

    /// Returns `true` if `field` is among the failures.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{sep}{} ({})", err.field, err.message)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_collects_missing_fields() {
        let mut errors = ValidationErrors::new("Title and body are required");
        assert_eq!(errors.require("title", Some("Hi")), Some("Hi"));
        assert_eq!(errors.require("body", Some("   ")), None);
        assert_eq!(errors.require("extra", None), None);

        assert!(!errors.has_field("title"));
        assert!(errors.has_field("body"));
        assert!(errors.has_field("extra"));
        assert_eq!(errors.errors.len(), 2);
    }

    #[test]
    fn test_display_lists_fields() {
        let errors = ValidationErrors::single("Invalid input", "email", "bad format");
        assert_eq!(errors.to_string(), "Invalid input: email (bad format)");
    }

    #[test]
    fn test_empty_is_ok() {
        assert!(ValidationErrors::new("unused").errors.is_empty());
    }
}
