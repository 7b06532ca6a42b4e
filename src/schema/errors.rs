//! Schema error types
//!
//! Error codes:
//! - NQ_SCHEMA_MALFORMED (FATAL)
//! - NQ_SCHEMA_UNKNOWN_TYPE (REJECT)

use std::fmt;

/// Severity levels for schema errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected
    Reject,
    /// Client cannot be constructed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Schema-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorCode {
    /// Schema file unreadable or structurally invalid
    NqSchemaMalformed,
    /// Type name or id prefix not present in the schema
    NqSchemaUnknownType,
}

impl SchemaErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            SchemaErrorCode::NqSchemaMalformed => "NQ_SCHEMA_MALFORMED",
            SchemaErrorCode::NqSchemaUnknownType => "NQ_SCHEMA_UNKNOWN_TYPE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            SchemaErrorCode::NqSchemaMalformed => Severity::Fatal,
            SchemaErrorCode::NqSchemaUnknownType => Severity::Reject,
        }
    }
}

impl fmt::Display for SchemaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Schema error type with full context
#[derive(Debug, Clone)]
pub struct SchemaError {
    code: SchemaErrorCode,
    message: String,
    source_name: Option<String>,
}

impl SchemaError {
    /// Create a malformed schema error
    pub fn malformed_schema(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        let source_name = source_name.into();
        Self {
            code: SchemaErrorCode::NqSchemaMalformed,
            message: format!("Malformed schema in {}: {}", source_name, reason.into()),
            source_name: Some(source_name),
        }
    }

    /// Create an unknown type error
    pub fn unknown_type(type_name: impl Into<String>) -> Self {
        Self {
            code: SchemaErrorCode::NqSchemaUnknownType,
            message: format!("Type '{}' is not defined in the schema", type_name.into()),
            source_name: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> SchemaErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the file or source the schema came from
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl std::error::Error for SchemaError {}

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;
