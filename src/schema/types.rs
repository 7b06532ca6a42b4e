//! Schema type definitions
//!
//! A schema maps every node type to a two-character id prefix and a field
//! tree. The field tree is what the decoder walks to pick a value decoder
//! for each wire key.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Id of the single root node
pub const ROOT_ID: &str = "root";

/// Type name of the root node
pub const ROOT_TYPE: &str = "root";

static TEXT_LANGUAGE_VALUE: FieldType = FieldType::String;

/// Field types known to the decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldType {
    String,
    Id,
    Digest,
    Url,
    Email,
    Phone,
    Type,
    Boolean,
    Number,
    Float,
    Int,
    Integer,
    Timestamp,
    /// Per-language strings
    Text,
    /// Opaque JSON stored as a string
    Json,
    Object {
        #[serde(default)]
        properties: BTreeMap<String, FieldType>,
    },
    /// Free-form keys, homogeneous values
    Record { values: Box<FieldType> },
    Array { items: Box<FieldType> },
    Set { items: Box<FieldType> },
    /// Single edge to another node
    Reference,
    /// Edge set to other nodes
    References,
}

impl FieldType {
    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Id => "id",
            FieldType::Digest => "digest",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Type => "type",
            FieldType::Boolean => "boolean",
            FieldType::Number => "number",
            FieldType::Float => "float",
            FieldType::Int => "int",
            FieldType::Integer => "integer",
            FieldType::Timestamp => "timestamp",
            FieldType::Text => "text",
            FieldType::Json => "json",
            FieldType::Object { .. } => "object",
            FieldType::Record { .. } => "record",
            FieldType::Array { .. } => "array",
            FieldType::Set { .. } => "set",
            FieldType::Reference => "reference",
            FieldType::References => "references",
        }
    }

    /// Whether values of this type are numeric on the wire
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Number
                | FieldType::Float
                | FieldType::Int
                | FieldType::Integer
                | FieldType::Timestamp
        )
    }

    /// Whether values of this type are edges that can be traversed
    pub fn is_edge(&self) -> bool {
        matches!(self, FieldType::Reference | FieldType::References)
    }

    /// Resolves one path segment below this type
    fn child(&self, segment: &str) -> Option<&FieldType> {
        match self {
            FieldType::Object { properties } => properties.get(segment),
            FieldType::Record { values } => Some(values),
            FieldType::Text => Some(&TEXT_LANGUAGE_VALUE),
            _ => None,
        }
    }
}

/// Definition of one node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Two-character id prefix
    #[serde(default)]
    pub prefix: String,
    /// Top-level fields
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
}

impl TypeSchema {
    /// Create a type with the given prefix and fields
    pub fn new(prefix: impl Into<String>, fields: BTreeMap<String, FieldType>) -> Self {
        Self {
            prefix: prefix.into(),
            fields,
        }
    }

    /// Resolves a dotted path (`a.b.c`) to its field type
    pub fn field(&self, path: &str) -> Option<&FieldType> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.get(first)?;
        for segment in segments {
            current = current.child(segment)?;
        }
        Some(current)
    }

    fn add_builtin_fields(&mut self) {
        let builtin = [
            ("id", FieldType::Id),
            ("type", FieldType::Type),
            ("parents", FieldType::References),
            ("children", FieldType::References),
            ("ancestors", FieldType::References),
            ("descendants", FieldType::References),
            ("createdAt", FieldType::Timestamp),
            ("updatedAt", FieldType::Timestamp),
            (
                "aliases",
                FieldType::Set {
                    items: Box::new(FieldType::String),
                },
            ),
        ];
        for (name, field_type) in builtin {
            self.fields.entry(name.to_string()).or_insert(field_type);
        }
    }
}

/// Complete database schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Languages accepted by `$language` and `text` fields
    #[serde(default)]
    pub languages: Vec<String>,
    /// Root node type
    #[serde(default = "default_root_type")]
    pub root_type: TypeSchema,
    /// Named node types
    #[serde(default)]
    pub types: BTreeMap<String, TypeSchema>,
    #[serde(skip)]
    prefix_to_type: HashMap<String, String>,
}

fn default_root_type() -> TypeSchema {
    TypeSchema::new("ro", BTreeMap::new())
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(Vec::new(), BTreeMap::new())
    }
}

impl Schema {
    /// Create a schema from its types; built-in fields and the prefix map are derived.
    pub fn new(languages: Vec<String>, types: BTreeMap<String, TypeSchema>) -> Self {
        let mut schema = Self {
            languages,
            root_type: default_root_type(),
            types,
            prefix_to_type: HashMap::new(),
        };
        schema.prepare();
        schema
    }

    /// Derives built-in fields and the prefix→type map.
    ///
    /// Must be called after deserialization; `SchemaLoader` does so.
    pub fn prepare(&mut self) {
        self.root_type.add_builtin_fields();
        if self.root_type.prefix.is_empty() {
            self.root_type.prefix = "ro".to_string();
        }
        self.prefix_to_type.clear();
        for (name, type_schema) in self.types.iter_mut() {
            type_schema.add_builtin_fields();
            self.prefix_to_type
                .insert(type_schema.prefix.clone(), name.clone());
        }
    }

    /// Returns the prefix→type map
    pub fn prefix_map(&self) -> &HashMap<String, String> {
        &self.prefix_to_type
    }

    /// Looks up a type by name (`"root"` is the root type)
    pub fn type_schema(&self, type_name: &str) -> Option<&TypeSchema> {
        if type_name == ROOT_TYPE {
            Some(&self.root_type)
        } else {
            self.types.get(type_name)
        }
    }

    /// Derives the concrete type name of a node from its id prefix
    pub fn type_of_id(&self, id: &str) -> Option<&str> {
        if id == ROOT_ID {
            return Some(ROOT_TYPE);
        }
        let prefix = id.get(0..2)?;
        self.prefix_to_type.get(prefix).map(String::as_str)
    }

    /// Resolves a dotted field path for a node id
    pub fn field_for_id(&self, id: &str, path: &str) -> Option<&FieldType> {
        let type_name = self.type_of_id(id)?;
        self.type_schema(type_name)?.field(path)
    }

    /// Whether `lang` is one of the schema languages (any language when none are declared)
    pub fn has_language(&self, lang: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l == lang)
    }

    /// Checks that prefixes are two characters and unique
    pub fn validate_structure(&self) -> Result<(), String> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for (name, type_schema) in &self.types {
            if type_schema.prefix.chars().count() != 2 {
                return Err(format!(
                    "Type '{}' must declare a two-character prefix, got '{}'",
                    name, type_schema.prefix
                ));
            }
            if type_schema.prefix == self.root_type.prefix {
                return Err(format!("Type '{}' reuses the root prefix", name));
            }
            if let Some(other) = seen.insert(type_schema.prefix.as_str(), name.as_str()) {
                return Err(format!(
                    "Types '{}' and '{}' share prefix '{}'",
                    other, name, type_schema.prefix
                ));
            }
        }
        Ok(())
    }
}
