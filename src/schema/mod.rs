//! Schema model for the hierarchical store
//!
//! The schema is read-only to the query layer. It answers two questions:
//! which concrete type a node id belongs to (by its two-character prefix),
//! and which field type sits at a dotted path inside that type.

mod errors;
mod loader;
mod types;

pub use errors::{SchemaError, SchemaErrorCode, SchemaResult};
pub use loader::SchemaLoader;
pub use types::{FieldType, Schema, TypeSchema, ROOT_ID, ROOT_TYPE};
