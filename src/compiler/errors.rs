//! Compiler error types
//!
//! Error codes:
//! - NQ_COMPILE_UNKNOWN_AGGREGATE
//! - NQ_COMPILE_MALFORMED_TARGET
//! - NQ_COMPILE_UNKNOWN_TYPE
//! - NQ_COMPILE_INVALID
//!
//! Validation and alias-resolution failures pass through unchanged.

use thiserror::Error;

use crate::query::ValidationError;
use crate::store::StoreError;

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Alias lookup failed
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Unknown aggregate function '{0}'")]
    UnknownAggregate(String),

    #[error("Malformed target at \"{path}\": {reason}")]
    MalformedTarget { path: String, reason: String },

    #[error("Unknown type '{0}'")]
    UnknownType(String),

    #[error("Invalid query at \"{path}\": {reason}")]
    Invalid { path: String, reason: String },
}

impl CompileError {
    pub fn unknown_aggregate(name: impl Into<String>) -> Self {
        CompileError::UnknownAggregate(name.into())
    }

    pub fn malformed_target(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::MalformedTarget {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CompileError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::Validation(e) => e.code(),
            CompileError::Store(e) => e.code(),
            CompileError::UnknownAggregate(_) => "NQ_COMPILE_UNKNOWN_AGGREGATE",
            CompileError::MalformedTarget { .. } => "NQ_COMPILE_MALFORMED_TARGET",
            CompileError::UnknownType(_) => "NQ_COMPILE_UNKNOWN_TYPE",
            CompileError::Invalid { .. } => "NQ_COMPILE_INVALID",
        }
    }
}
