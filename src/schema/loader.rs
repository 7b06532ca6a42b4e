//! Schema loader
//!
//! Reads a schema document (JSON) from disk or memory, derives the
//! prefix map and built-in fields, and checks the structure.

use std::fs;
use std::path::Path;

use super::errors::{SchemaError, SchemaResult};
use super::types::Schema;
use crate::observability::{log_event_with_fields, Event};

/// Loads schema documents
pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads a schema file.
    pub fn load_file(path: &Path) -> SchemaResult<Schema> {
        let content = fs::read_to_string(path).map_err(|e| {
            SchemaError::malformed_schema(
                path.display().to_string(),
                format!("Failed to read file: {}", e),
            )
        })?;
        Self::load_named(&path.display().to_string(), &content)
    }

    /// Loads a schema from a JSON string.
    pub fn load_str(content: &str) -> SchemaResult<Schema> {
        Self::load_named("<in-memory>", content)
    }

    fn load_named(source_name: &str, content: &str) -> SchemaResult<Schema> {
        let mut schema: Schema = serde_json::from_str(content).map_err(|e| {
            SchemaError::malformed_schema(source_name, format!("Invalid JSON: {}", e))
        })?;

        schema.prepare();
        schema
            .validate_structure()
            .map_err(|e| SchemaError::malformed_schema(source_name, e))?;

        let type_count = schema.types.len().to_string();
        log_event_with_fields(
            Event::SchemaLoaded,
            &[("source", source_name), ("types", type_count.as_str())],
        );

        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SCHEMA: &str = r#"{
        "languages": ["en", "de"],
        "types": {
            "match": { "prefix": "ma", "fields": { "title": { "type": "text" } } },
            "team": { "prefix": "te", "fields": { "name": { "type": "string" } } }
        }
    }"#;

    #[test]
    fn test_load_str() {
        let schema = SchemaLoader::load_str(SCHEMA).unwrap();
        assert_eq!(schema.type_of_id("te0001"), Some("team"));
        assert!(schema.has_language("de"));
        assert!(!schema.has_language("fr"));
    }

    #[test]
    fn test_load_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SCHEMA.as_bytes()).unwrap();
        let schema = SchemaLoader::load_file(file.path()).unwrap();
        assert_eq!(schema.types.len(), 2);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = SchemaLoader::load_str("{ not json").unwrap_err();
        assert!(err.message().contains("Invalid JSON"));
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let err = SchemaLoader::load_str(r#"{ "types": { "x": { "prefix": "abc" } } }"#)
            .unwrap_err();
        assert!(err.message().contains("two-character prefix"));
    }
}
