//! Expression bridge
//!
//! Turns filter trees and per-type field selections into the RPN token
//! programs the store evaluates. The compiler and executor only assemble
//! inputs; whatever tokens the bridge returns go on the wire verbatim.

mod rpn;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::query::Fork;
use crate::schema::Schema;

pub use rpn::RpnBridge;

/// Result type for bridge calls
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// A selection named a type the schema does not define
    #[error("Unknown type in field selection: {0}")]
    UnknownType(String),

    /// A filter value cannot be expressed as a token
    #[error("Cannot encode value of {field}: {detail}")]
    InvalidValue { field: String, detail: String },
}

/// Compiles ASTs into RPN
pub trait ExpressionBridge: Send + Sync {
    /// Filter tree to token program
    fn compile_filter(&self, filter: &Fork, schema: &Schema, lang: &str)
        -> BridgeResult<Vec<String>>;

    /// `{typeName | "$any": "path\npath"}` to one field-selection expression
    fn compile_field_selection(
        &self,
        by_type: &BTreeMap<String, String>,
        schema: &Schema,
        lang: &str,
    ) -> BridgeResult<String>;
}
