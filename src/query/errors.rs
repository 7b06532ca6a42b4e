//! Query validation errors
//!
//! Error codes:
//! - NQ_QUERY_INVALID (REJECT)

use std::fmt;

/// Directive misuse found by the validation pre-pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    reason: String,
    path: String,
}

impl ValidationError {
    /// Create a validation error at a dotted path
    pub fn new(reason: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            path: path.into(),
        }
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        "NQ_QUERY_INVALID"
    }

    /// Human readable reason
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Dotted path of the offending key
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query error: {} at \"{}\"", self.reason, self.path)
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation
pub type ValidationResult<T> = Result<T, ValidationError>;
