//! Decoder error types
//!
//! Error codes:
//! - NQ_DECODE_UNKNOWN_PREFIX
//! - NQ_DECODE_MALFORMED_ROW
//! - NQ_DECODE_TYPE_MISMATCH

use thiserror::Error;

/// Result type for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// Node id whose prefix maps to no schema type
    #[error("Unknown type prefix for node '{0}'")]
    UnknownPrefix(String),

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// A wire value that does not fit the declared field type
    #[error("Type mismatch at '{path}': expected {expected}, got {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

impl DecodeError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        DecodeError::MalformedRow(detail.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::UnknownPrefix(_) => "NQ_DECODE_UNKNOWN_PREFIX",
            DecodeError::MalformedRow(_) => "NQ_DECODE_MALFORMED_ROW",
            DecodeError::TypeMismatch { .. } => "NQ_DECODE_TYPE_MISMATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_mismatch_display() {
        let err = DecodeError::TypeMismatch {
            path: "age".into(),
            expected: "integer".into(),
            found: "string".into(),
        };
        assert_eq!(
            err.to_string(),
            "Type mismatch at 'age': expected integer, got string"
        );
        assert_eq!(err.code(), "NQ_DECODE_TYPE_MISMATCH");
    }
}
